use super::{
    clean_host, converted_name, ConversionContext, ConvertError, DomainEntry, WrapperGateway,
};
use crate::{IngressConfig, ServiceLookup};
use meshgate_ingress_core::{
    gateway::{Gateway, Port, Protocol, Server, ServerTls, TlsMode},
    Event,
};
use meshgate_ingress_k8s_api::IngressTLS;
use std::collections::btree_map::Entry;

impl<S: ServiceLookup> super::Converter<S> {
    /// Creates a gateway for every host named by the ingress's rules.
    ///
    /// Every gateway gets a plain HTTP listener when it is created. The first ingress to
    /// provide a TLS secret for a host adds the TLS listener; later claims are rejected as
    /// `DuplicatedTls`.
    pub(super) fn convert_gateway(
        &self,
        ctx: &mut ConversionContext,
        config: &IngressConfig,
    ) -> Result<(), ConvertError> {
        if config.annotations.is_canary() {
            return Ok(());
        }
        self.ensure_not_empty(config, false)?;

        let ns = &config.id.namespace;
        let tls = config.spec.tls.as_deref().unwrap_or_default();
        for rule in config.spec.rules.iter().flatten() {
            let Some(host) = rule.host.clone().filter(|h| !h.is_empty()) else {
                continue;
            };
            let cleaned = clean_host(&host);
            let previous = ctx.domains.valid.get(&host).map(|d| d.source.clone());

            let gateway = match ctx.gateways.entry(host.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    tracing::debug!(%ns, name = %config.id.name, %host, "Creating gateway");
                    ctx.domains
                        .valid
                        .insert(host.clone(), DomainEntry::http(&host, &config.id));
                    entry.insert(WrapperGateway {
                        host: host.clone(),
                        source: config.id.clone(),
                        gateway: Gateway {
                            selector: self.cluster.gateway_selector.clone(),
                            servers: vec![Server {
                                port: Port {
                                    number: 80,
                                    protocol: Protocol::Http,
                                    name: converted_name(&[
                                        "http-80-ingress",
                                        &self.cluster.cluster_id,
                                        ns,
                                        &config.id.name,
                                        &cleaned,
                                    ]),
                                },
                                hosts: vec![host.clone()],
                                tls: None,
                            }],
                        },
                    })
                }
            };

            let Some(secret) = tls_secret_for(&host, tls) else {
                continue;
            };

            let mut domain = DomainEntry::http(&host, &config.id);
            domain.protocol = Protocol::Https;
            domain.secret_name = Some(self.cluster.secret_path(ns, secret));

            if gateway.gateway.is_https() {
                tracing::warn!(
                    %ns,
                    name = %config.id.name,
                    %host,
                    previous = ?previous,
                    "Host already has a TLS listener"
                );
                domain.event = Event::DuplicatedTls;
                domain.previous = previous;
                self.metrics
                    .record_invalid(&self.cluster.cluster_id, Event::DuplicatedTls);
                ctx.domains.invalid.push(domain);
                continue;
            }

            gateway.gateway.servers.push(Server {
                port: Port {
                    number: 443,
                    protocol: Protocol::Https,
                    name: converted_name(&[
                        "https-443-ingress",
                        &self.cluster.cluster_id,
                        ns,
                        &config.id.name,
                        &cleaned,
                    ]),
                },
                hosts: vec![host.clone()],
                tls: Some(ServerTls {
                    mode: TlsMode::Simple,
                    credential_name: self.cluster.credential_name(ns, secret),
                }),
            });
            ctx.domains.valid.insert(host, domain);
        }

        Ok(())
    }
}

/// Returns the secret of the first TLS block that lists `host`.
fn tls_secret_for<'t>(host: &str, tls: &'t [IngressTLS]) -> Option<&'t str> {
    tls.iter()
        .find(|t| t.hosts.iter().flatten().any(|h| h == host))
        .and_then(|t| t.secret_name.as_deref())
        .filter(|s| !s.is_empty())
}
