use super::{ConversionContext, ConvertError, RouteRegistry, WrapperHttpRoute};
use crate::{
    annotations::{Canary, CanaryKind, CanaryMatch, HeaderValueMatch},
    IngressConfig, ServiceLookup,
};
use meshgate_ingress_core::{
    http_route::{HttpMatchRequest, StringMatch},
    DEFAULT_HOST,
};

impl<S: ServiceLookup> super::Converter<S> {
    /// Merges a canary ingress into the routes built for its hosts.
    ///
    /// Each canary path is matched to the non-canary route with the same original path and path
    /// type. Header and cookie canaries are inserted ahead of that route with an additional
    /// header match. Weighted canaries add a destination to that route and take their weight
    /// from the route's first destination. Canary paths without such a route are dropped.
    pub(super) fn apply_canary_ingress(
        &self,
        ctx: &mut ConversionContext,
        config: &IngressConfig,
    ) -> Result<(), ConvertError> {
        let (Some(kind), Some(canary)) = (
            config.annotations.canary_kind(),
            config.annotations.canary.as_ref(),
        ) else {
            return Ok(());
        };
        self.ensure_not_empty(config, true)?;

        let ns = &config.id.namespace;
        for rule in config.spec.rules.iter().flatten() {
            let host = rule.host.as_deref().unwrap_or(DEFAULT_HOST);
            let Some(http) = rule.http.as_ref().filter(|h| !h.paths.is_empty()) else {
                tracing::warn!(%ns, name = %config.id.name, %host, "Rule has no paths");
                continue;
            };
            if !ctx.http_routes.contains_key(host) {
                tracing::debug!(%ns, name = %config.id.name, %host, "No routes for canary host");
                continue;
            }

            for path in &http.paths {
                let mut route = self.build_route(config, host, path, true);
                let mut entry = RouteRegistry::new_entry(&route);
                let (destinations, event) =
                    self.backend_to_destinations(&path.backend, ns, &mut entry);
                if !event.is_normal() {
                    tracing::warn!(
                        %ns,
                        name = %config.id.name,
                        %host,
                        path = %entry.path,
                        %event,
                        "Rejected canary route"
                    );
                    self.metrics.record_invalid(&self.cluster.cluster_id, event);
                    entry.event = event;
                    ctx.routes.add(entry);
                    continue;
                }
                route.route.route = destinations;

                let Some(routes) = ctx.http_routes.get_mut(host) else {
                    continue;
                };
                let Some(pos) = routes.iter().position(|base| is_base_of(base, &route)) else {
                    tracing::debug!(
                        %ns,
                        name = %config.id.name,
                        %host,
                        path = %route.origin_path,
                        "No route to apply canary to"
                    );
                    continue;
                };

                match kind {
                    CanaryKind::Header => {
                        let base = &routes[pos];
                        apply_by_header(&mut route, base, canary);
                        route.auth = base.auth.clone();
                        route.route.name = self.route_name(&route);
                        entry.route_name = route.route.name.clone();
                        routes.insert(pos, route);
                        ctx.routes.add(entry);
                    }
                    CanaryKind::Weight => {
                        let base = &mut routes[pos];
                        if base.weight_total == 0 {
                            base.weight_total = canary.weight_total;
                        }
                        apply_by_weight(&route, base, canary.weight);
                        ctx.routes.update(base);
                    }
                }
            }
        }

        Ok(())
    }
}

/// A canary applies to the non-canary route with the same original path and path type.
fn is_base_of(base: &WrapperHttpRoute, canary: &WrapperHttpRoute) -> bool {
    !base.is_canary
        && base.origin_path == canary.origin_path
        && base.origin_path_type == canary.origin_path_type
}

/// Copies the base route's matches onto the canary, adding the canary header or cookie match to
/// each of them.
fn apply_by_header(canary: &mut WrapperHttpRoute, base: &WrapperHttpRoute, config: &Canary) {
    let Some(matcher) = config.matcher.as_ref() else {
        return;
    };
    let (header, value) = match matcher {
        CanaryMatch::Header { name, value } => {
            let value = match value {
                HeaderValueMatch::Always => StringMatch::Exact("always".to_string()),
                HeaderValueMatch::Exact(v) => StringMatch::Exact(v.clone()),
                HeaderValueMatch::Pattern(p) => StringMatch::Regex(p.clone()),
            };
            (name.as_str().to_string(), value)
        }
        CanaryMatch::Cookie(cookie) => (
            "cookie".to_string(),
            StringMatch::Regex(format!(
                r"^(.*?;\s*)?({}=always)(;.*)?$",
                regex::escape(cookie)
            )),
        ),
    };

    let mut matches = base.route.matches.clone();
    if matches.is_empty() {
        matches.push(HttpMatchRequest::default());
    }
    for m in &mut matches {
        m.headers.insert(header.clone(), value.clone());
    }
    canary.route.matches = matches;
}

/// Adds the canary's destinations to the base route with the canary weight. The base route's
/// first destination receives the remainder of the total weight.
fn apply_by_weight(canary: &WrapperHttpRoute, base: &mut WrapperHttpRoute, weight: u32) {
    base.route
        .route
        .extend(canary.route.route.iter().cloned().map(|mut d| {
            d.weight = weight;
            d
        }));

    let canaries = base.route.route.iter().skip(1).map(|d| d.weight).sum::<u32>();
    let total = base.weight_total;
    if let Some(primary) = base.route.route.first_mut() {
        primary.weight = total.saturating_sub(canaries);
    }
}
