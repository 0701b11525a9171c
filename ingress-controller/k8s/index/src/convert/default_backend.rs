use super::{
    ConversionContext, ConvertError, RouteRegistry, WrapperHttpRoute, WrapperVirtualService,
};
use crate::{IngressConfig, ServiceLookup};
use meshgate_ingress_core::{
    http_route::{HttpRoute, PathType},
    Event, DEFAULT_HOST, DEFAULT_PATH,
};
use meshgate_ingress_k8s_api::IngressBackend;

impl<S: ServiceLookup> super::Converter<S> {
    /// Installs the ingress's default backend as a catch-all route.
    ///
    /// On the wildcard host, the default backend replaces any catch-all route installed by an
    /// earlier default backend. On every other host named by the ingress, it is appended unless
    /// a catch-all route is already configured.
    pub(super) fn apply_default_backend(
        &self,
        ctx: &mut ConversionContext,
        config: &IngressConfig,
    ) -> Result<(), ConvertError> {
        if config.annotations.is_canary() {
            return Ok(());
        }
        let Some(backend) = config.spec.default_backend.as_ref() else {
            return Ok(());
        };
        self.ensure_not_empty(config, false)?;

        self.apply_wildcard_default_backend(ctx, config, backend);

        for rule in config.spec.rules.iter().flatten() {
            let Some(host) = rule.host.as_deref().filter(|h| *h != DEFAULT_HOST && !h.is_empty())
            else {
                continue;
            };
            if ctx
                .virtual_services
                .get(host)
                .is_some_and(|vs| vs.configured_default_backend)
            {
                continue;
            }
            let Some(route) = self.default_route(&mut ctx.routes, config, backend, host) else {
                continue;
            };

            ctx.virtual_services
                .entry(host.to_string())
                .or_insert_with(|| WrapperVirtualService::new(host, &config.id))
                .configured_default_backend = true;
            ctx.routes.new_and_add(&route);
            ctx.http_routes.entry(host.to_string()).or_default().push(route);
        }

        Ok(())
    }

    fn apply_wildcard_default_backend(
        &self,
        ctx: &mut ConversionContext,
        config: &IngressConfig,
        backend: &IngressBackend,
    ) {
        if ctx
            .virtual_services
            .get(DEFAULT_HOST)
            .is_some_and(|vs| vs.configured_default_backend)
        {
            return;
        }
        let Some(default_route) =
            self.default_route(&mut ctx.routes, config, backend, DEFAULT_HOST)
        else {
            return;
        };

        ctx.virtual_services
            .entry(DEFAULT_HOST.to_string())
            .or_insert_with(|| WrapperVirtualService::new(DEFAULT_HOST, &config.id));

        let routes = ctx.http_routes.entry(DEFAULT_HOST.to_string()).or_default();
        let mut replaced = false;
        for route in routes.iter_mut().filter(|r| r.is_catch_all()) {
            tracing::debug!(
                ns = %config.id.namespace,
                name = %config.id.name,
                previous = %route.source,
                "Replacing default backend"
            );
            ctx.routes.delete(route);
            route.route = default_route.route.clone();
            route.source = default_route.source.clone();
            route.is_default_backend = true;
            ctx.routes.new_and_add(route);
            replaced = true;
        }

        if !replaced {
            ctx.routes.new_and_add(&default_route);
            routes.push(default_route);
        }
    }

    /// Builds a catch-all route to the default backend. If the backend cannot be resolved, the
    /// rejection is recorded and `None` is returned.
    fn default_route(
        &self,
        registry: &mut RouteRegistry,
        config: &IngressConfig,
        backend: &IngressBackend,
        host: &str,
    ) -> Option<WrapperHttpRoute> {
        let mut route = WrapperHttpRoute {
            route: HttpRoute::default(),
            source: config.id.clone(),
            host: host.to_string(),
            origin_path: DEFAULT_PATH.to_string(),
            origin_path_type: PathType::Prefix,
            is_default_backend: true,
            is_canary: false,
            weight_total: 0,
            auth: config.annotations.auth.clone(),
        };
        route.route.name = self.route_name(&route);

        let mut entry = RouteRegistry::new_entry(&route);
        let (destinations, event) =
            self.backend_to_destinations(backend, &config.id.namespace, &mut entry);
        if event != Event::Normal {
            tracing::warn!(
                ns = %config.id.namespace,
                name = %config.id.name,
                %host,
                %event,
                "Invalid default backend"
            );
            self.metrics.record_invalid(&self.cluster.cluster_id, event);
            entry.event = event;
            registry.add(entry);
            return None;
        }

        route.route.route = destinations;
        Some(route)
    }
}
