//! Converts ingresses into mesh routing configuration.
//!
//! A conversion pass folds every eligible ingress into a single [`ConversionContext`]. Each
//! builder is a separate pass over all configs, and the passes always run in the same order:
//!
//! 1. gateways, one per host, with HTTP and TLS listeners;
//! 2. HTTP routes, grouped by host and ordered by match precedence. Canary ingresses are
//!    deferred;
//! 3. canary overlays, merged into the routes built by the previous pass;
//! 4. default backends, installed as catch-all routes;
//! 5. per-service traffic policies.
//!
//! Failures are isolated to the fragment that produced them: they are classified, counted, and
//! logged, and the pass continues with the remaining rules and resources.

mod canary;
mod default_backend;
mod gateway;
mod names;
mod registry;
mod route;
mod traffic_policy;

pub use self::{
    names::{clean_host, converted_name},
    registry::{DomainCache, DomainEntry, RouteEntry, RouteRegistry},
};
use crate::{
    annotations::Auth, ClusterInfo, ConversionMetrics, IngressConfig, PortError, ServiceLookup,
};
use ahash::AHashMap as HashMap;
use meshgate_ingress_core::{
    gateway::Gateway,
    http_route::{HttpRoute, PathType},
    traffic_policy::TrafficPolicy,
    Event, ServiceKey, DEFAULT_PATH,
};
use meshgate_ingress_k8s_api::{IngressServiceBackend, ResourceId};
use std::{collections::BTreeMap, sync::Arc};

/// Holds the output of a conversion pass.
#[derive(Debug, Default)]
pub struct ConversionContext {
    pub gateways: BTreeMap<String, WrapperGateway>,
    pub virtual_services: BTreeMap<String, WrapperVirtualService>,

    /// Routes by host, in evaluation order.
    pub http_routes: BTreeMap<String, Vec<WrapperHttpRoute>>,

    pub routes: RouteRegistry,
    pub domains: DomainCache,
    pub traffic_policies: BTreeMap<ServiceKey, WrapperTrafficPolicy>,

    /// Set when any non-canary ingress declares a default backend. The default-backend pass is
    /// skipped otherwise.
    pub has_default_backend: bool,

    canaries: Vec<Arc<IngressConfig>>,

    /// Maps `host-path` to the first ingress that claimed it.
    host_and_path: HashMap<String, ResourceId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WrapperGateway {
    pub host: String,
    pub source: ResourceId,
    pub gateway: Gateway,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WrapperVirtualService {
    pub host: String,
    pub source: ResourceId,
    /// Set once a catch-all prefix route has been configured for the host.
    pub configured_default_backend: bool,
    pub app_root: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WrapperHttpRoute {
    pub route: HttpRoute,
    pub source: ResourceId,
    pub host: String,
    pub origin_path: String,
    pub origin_path_type: PathType,
    pub is_default_backend: bool,
    pub is_canary: bool,
    /// The total weight split between this route's destinations. Zero until a weighted canary
    /// is merged into the route.
    pub weight_total: u32,
    pub auth: Option<Auth>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WrapperTrafficPolicy {
    pub key: ServiceKey,
    pub source: ResourceId,
    pub policy: TrafficPolicy,
}

/// Runs conversion passes.
#[derive(Clone, Debug)]
pub struct Converter<S> {
    cluster: Arc<ClusterInfo>,
    services: S,
    metrics: ConversionMetrics,
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("ingress has neither rules nor a default backend")]
    EmptyRule,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Pass {
    Gateway,
    HttpRoute,
    Canary,
    DefaultBackend,
    TrafficPolicy,
}

// === impl ConversionContext ===

impl ConversionContext {
    pub fn routes_for(&self, host: &str) -> &[WrapperHttpRoute] {
        self.http_routes.get(host).map(Vec::as_slice).unwrap_or(&[])
    }
}

// === impl WrapperVirtualService ===

impl WrapperVirtualService {
    fn new(host: &str, source: &ResourceId) -> Self {
        Self {
            host: host.to_string(),
            source: source.clone(),
            configured_default_backend: false,
            app_root: None,
        }
    }
}

// === impl WrapperHttpRoute ===

impl WrapperHttpRoute {
    /// Identifies the route within a single ingress.
    pub fn path_format(&self) -> String {
        format!(
            "{}-{}-{}",
            self.host,
            self.origin_path_type.as_str(),
            self.origin_path
        )
    }

    /// Identifies the route across ingresses, regardless of path type.
    pub fn base_path_format(&self) -> String {
        format!("{}-{}", self.host, self.origin_path)
    }

    fn is_catch_all(&self) -> bool {
        self.origin_path_type == PathType::Prefix && self.origin_path == DEFAULT_PATH
    }
}

// === impl Pass ===

impl Pass {
    const ORDER: [Pass; 5] = [
        Pass::Gateway,
        Pass::HttpRoute,
        Pass::Canary,
        Pass::DefaultBackend,
        Pass::TrafficPolicy,
    ];
}

// === impl Converter ===

impl<S: ServiceLookup> Converter<S> {
    pub fn new(cluster: Arc<ClusterInfo>, services: S, metrics: ConversionMetrics) -> Self {
        Self {
            cluster,
            services,
            metrics,
        }
    }

    pub fn cluster(&self) -> &ClusterInfo {
        &self.cluster
    }

    /// Converts `configs` into a new context.
    ///
    /// Configs are processed oldest first, regardless of the order in which they are provided.
    pub fn convert(&self, configs: &[Arc<IngressConfig>]) -> ConversionContext {
        let mut configs = configs.to_vec();
        configs.sort_by(|a, b| a.cmp_age(b));

        let mut ctx = ConversionContext::default();
        for pass in Pass::ORDER {
            if pass == Pass::Canary {
                for config in std::mem::take(&mut ctx.canaries) {
                    self.run(pass, &mut ctx, &config);
                }
                continue;
            }
            if pass == Pass::DefaultBackend && !ctx.has_default_backend {
                continue;
            }

            for config in &configs {
                self.run(pass, &mut ctx, config);
            }
        }
        ctx
    }

    fn run(&self, pass: Pass, ctx: &mut ConversionContext, config: &Arc<IngressConfig>) {
        let res = match pass {
            Pass::Gateway => self.convert_gateway(ctx, config),
            Pass::HttpRoute => self.convert_http_route(ctx, config),
            Pass::Canary => self.apply_canary_ingress(ctx, config),
            Pass::DefaultBackend => self.apply_default_backend(ctx, config),
            Pass::TrafficPolicy => self.convert_traffic_policy(ctx, config),
        };
        if let Err(error) = res {
            tracing::debug!(
                ns = %config.id.namespace,
                name = %config.id.name,
                ?pass,
                %error,
                "Skipped ingress"
            );
        }
    }

    /// Fails if the ingress has nothing to convert. When `record` is set, the rejection is
    /// counted.
    fn ensure_not_empty(&self, config: &IngressConfig, record: bool) -> Result<(), ConvertError> {
        if !config.is_empty() {
            return Ok(());
        }
        if record {
            tracing::warn!(
                ns = %config.id.namespace,
                name = %config.id.name,
                "Ingress has neither rules nor a default backend"
            );
            self.metrics
                .record_invalid(&self.cluster.cluster_id, Event::EmptyRule);
        }
        Err(ConvertError::EmptyRule)
    }

    /// Returns the numeric port referenced by a service backend.
    fn resolve_port(
        &self,
        namespace: &str,
        backend: &IngressServiceBackend,
    ) -> Result<i32, PortError> {
        let port = backend.port.as_ref();
        if let Some(number) = port.and_then(|p| p.number).filter(|n| *n > 0) {
            return Ok(number);
        }
        let name = port.and_then(|p| p.name.as_deref()).unwrap_or_default();
        self.services.resolve_named_port(namespace, &backend.name, name)
    }

    fn route_name(&self, route: &WrapperHttpRoute) -> String {
        let suffix = if route.is_canary {
            "canary"
        } else if route.is_default_backend {
            "default"
        } else {
            ""
        };
        let name = converted_name(&[
            &self.cluster.cluster_id,
            &route.source.namespace,
            &route.source.name,
            &clean_host(&route.host),
            &names::path_hash(route.origin_path_type, &route.origin_path),
        ]);
        if suffix.is_empty() {
            return name;
        }
        format!("{name}-{suffix}")
    }
}
