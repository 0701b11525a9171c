use super::{ConversionContext, ConvertError, WrapperTrafficPolicy};
use crate::{IngressConfig, ServiceLookup};
use meshgate_ingress_core::{traffic_policy::TrafficPolicy, ServiceKey};
use meshgate_ingress_k8s_api::IngressBackend;

impl<S: ServiceLookup> super::Converter<S> {
    /// Records a traffic policy for every backend service port referenced by the ingress, when
    /// its annotations require one. The oldest ingress to reference a service port owns its
    /// policy.
    pub(super) fn convert_traffic_policy(
        &self,
        ctx: &mut ConversionContext,
        config: &IngressConfig,
    ) -> Result<(), ConvertError> {
        if config.annotations.is_canary() || !config.annotations.needs_traffic_policy() {
            return Ok(());
        }
        self.ensure_not_empty(config, false)?;

        let backends = config.spec.default_backend.iter().chain(
            config
                .spec
                .rules
                .iter()
                .flatten()
                .flat_map(|r| r.http.iter().flat_map(|h| h.paths.iter()))
                .map(|p| &p.backend),
        );
        for backend in backends {
            let Some(key) = self.service_key(config, backend) else {
                continue;
            };
            ctx.traffic_policies
                .entry(key.clone())
                .or_insert_with(|| WrapperTrafficPolicy {
                    policy: TrafficPolicy {
                        port: key.port.unsigned_abs(),
                        load_balancer: config.annotations.load_balancer.clone(),
                        upstream_tls: config.annotations.upstream_tls,
                    },
                    key,
                    source: config.id.clone(),
                });
        }

        Ok(())
    }

    fn service_key(&self, config: &IngressConfig, backend: &IngressBackend) -> Option<ServiceKey> {
        let ns = &config.id.namespace;
        let service = backend.service.as_ref().filter(|s| !s.name.is_empty())?;
        match self.resolve_port(ns, service) {
            Ok(port) => Some(ServiceKey {
                namespace: ns.clone(),
                name: service.name.clone(),
                port,
            }),
            Err(error) => {
                tracing::warn!(
                    %ns,
                    name = %config.id.name,
                    service = %service.name,
                    %error,
                    "Failed to resolve traffic policy port"
                );
                None
            }
        }
    }
}
