use super::{
    ConversionContext, ConvertError, RouteEntry, RouteRegistry, WrapperHttpRoute,
    WrapperVirtualService,
};
use crate::{IngressConfig, ServiceLookup};
use ahash::AHashSet as HashSet;
use meshgate_ingress_core::{
    http_route::{
        Destination, HttpMatchRequest, HttpRoute, HttpRouteDestination, PathType, StringMatch,
    },
    Event, DEFAULT_HOST, DEFAULT_PATH,
};
use meshgate_ingress_k8s_api::{HTTPIngressPath, IngressBackend, PATH_TYPE_EXACT};
use std::sync::Arc;

/// Matches the prefix itself or any sub-path of it.
const PREFIX_MATCH_REGEX: &str = r"((\/).*)?";

const DEFAULT_WEIGHT: u32 = 100;

impl<S: ServiceLookup> super::Converter<S> {
    /// Builds the HTTP routes for every path of every rule.
    ///
    /// A path repeated within the same ingress, or a host and path already claimed by an older
    /// ingress, is rejected as `DuplicatedRoute`. Canary ingresses are deferred until all other
    /// routes have been built.
    pub(super) fn convert_http_route(
        &self,
        ctx: &mut ConversionContext,
        config: &Arc<IngressConfig>,
    ) -> Result<(), ConvertError> {
        if config.annotations.is_canary() {
            ctx.canaries.push(config.clone());
            return Ok(());
        }
        self.ensure_not_empty(config, true)?;

        if config
            .spec
            .default_backend
            .as_ref()
            .and_then(|b| b.service.as_ref())
            .is_some_and(|s| !s.name.is_empty())
        {
            ctx.has_default_backend = true;
        }

        let ns = &config.id.namespace;
        let mut defined = HashSet::new();
        let mut claims = Vec::new();
        for rule in config.spec.rules.iter().flatten() {
            let host = rule.host.as_deref().unwrap_or(DEFAULT_HOST);
            let Some(http) = rule.http.as_ref().filter(|h| !h.paths.is_empty()) else {
                tracing::warn!(%ns, name = %config.id.name, %host, "Rule has no paths");
                continue;
            };

            let vs = ctx
                .virtual_services
                .entry(host.to_string())
                .or_insert_with(|| WrapperVirtualService::new(host, &config.id));
            if let Some(app_root) = config.annotations.app_root.as_ref() {
                vs.app_root = Some(app_root.clone());
            }

            let mut accepted = Vec::with_capacity(http.paths.len());
            for path in &http.paths {
                let mut route = self.build_route(config, host, path, false);
                if route.is_catch_all() {
                    vs.configured_default_backend = true;
                }

                let mut entry = RouteRegistry::new_entry(&route);
                let host_and_path = route.base_path_format();
                if let Some(previous) = ctx.host_and_path.get(&host_and_path) {
                    entry.event = Event::DuplicatedRoute;
                    entry.previous = Some(previous.clone());
                } else if !defined.insert(route.path_format()) {
                    entry.event = Event::DuplicatedRoute;
                    entry.previous = Some(config.id.clone());
                }
                claims.push(host_and_path);

                let (destinations, event) =
                    self.backend_to_destinations(&path.backend, ns, &mut entry);
                if entry.event.is_normal() {
                    entry.event = event;
                }

                if entry.event.is_normal() {
                    route.route.route = destinations;
                    accepted.push(route);
                } else {
                    tracing::warn!(
                        %ns,
                        name = %config.id.name,
                        %host,
                        path = %entry.path,
                        event = %entry.event,
                        previous = ?entry.previous,
                        "Rejected route"
                    );
                    self.metrics
                        .record_invalid(&self.cluster.cluster_id, entry.event);
                }
                ctx.routes.add(entry);
            }

            let routes = ctx.http_routes.entry(host.to_string()).or_default();
            routes.extend(accepted);
            sort_routes(routes);
        }

        // Claims only apply to ingresses processed after this one.
        for claim in claims {
            ctx.host_and_path
                .entry(claim)
                .or_insert_with(|| config.id.clone());
        }

        Ok(())
    }

    /// Builds a route for an ingress path, without destinations.
    pub(super) fn build_route(
        &self,
        config: &IngressConfig,
        host: &str,
        path: &HTTPIngressPath,
        is_canary: bool,
    ) -> WrapperHttpRoute {
        let raw = path.path.as_deref().unwrap_or(DEFAULT_PATH);
        let (origin_path_type, origin_path, uri) = if config.annotations.needs_regex_match() {
            (
                PathType::Regex,
                raw.to_string(),
                StringMatch::Regex(format!("{raw}.*")),
            )
        } else if path.path_type == PATH_TYPE_EXACT {
            (
                PathType::Exact,
                raw.to_string(),
                StringMatch::Exact(raw.to_string()),
            )
        } else if raw == DEFAULT_PATH {
            (
                PathType::Prefix,
                raw.to_string(),
                StringMatch::Prefix(raw.to_string()),
            )
        } else {
            let trimmed = raw.strip_suffix('/').unwrap_or(raw);
            (
                PathType::Prefix,
                trimmed.to_string(),
                StringMatch::Regex(format!("{}{PREFIX_MATCH_REGEX}", regex::escape(trimmed))),
            )
        };

        let mut route = WrapperHttpRoute {
            route: HttpRoute {
                name: String::new(),
                matches: vec![HttpMatchRequest {
                    uri: Some(uri),
                    ..Default::default()
                }],
                route: Vec::new(),
            },
            source: config.id.clone(),
            host: host.to_string(),
            origin_path,
            origin_path_type,
            is_default_backend: false,
            is_canary,
            weight_total: 0,
            auth: config.annotations.auth.clone(),
        };
        route.route.name = self.route_name(&route);
        route
    }

    /// Resolves an ingress backend into weighted destinations, recording the referenced port
    /// and services on `entry`.
    pub(super) fn backend_to_destinations(
        &self,
        backend: &IngressBackend,
        namespace: &str,
        entry: &mut RouteEntry,
    ) -> (Vec<HttpRouteDestination>, Event) {
        let Some(service) = backend.service.as_ref().filter(|s| !s.name.is_empty()) else {
            return (Vec::new(), Event::InvalidBackendService);
        };
        entry.port_name = service.port.as_ref().and_then(|p| p.name.clone());

        let port = match self.resolve_port(namespace, service) {
            Ok(port) => port,
            Err(error) => {
                tracing::debug!(%error, "Failed to resolve backend port");
                return (Vec::new(), Event::PortNameResolveError);
            }
        };
        let Ok(port) = u32::try_from(port) else {
            return (Vec::new(), Event::PortNameResolveError);
        };

        let destination = HttpRouteDestination {
            destination: Destination {
                namespace: namespace.to_string(),
                service: service.name.clone(),
                host: self.cluster.service_fqdn(namespace, &service.name),
                port,
            },
            weight: DEFAULT_WEIGHT,
        };
        entry.services = vec![destination.backend()];
        (vec![destination], Event::Normal)
    }
}

/// Orders routes so that exact matches are evaluated before prefixes, and prefixes before
/// regular expressions. The sort is stable.
fn sort_routes(routes: &mut [WrapperHttpRoute]) {
    routes.sort_by_key(|r| r.origin_path_type);
}
