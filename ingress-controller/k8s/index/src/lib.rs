//! Ingress conversion indexing
//!
//! The controller watches `Ingress`, `IngressClass`, and `Service` resources from the Kubernetes
//! API and caches them in shared indexes. On each distribution pass, every eligible ingress is
//! validated and defaulted into an [`IngressConfig`], and the [`Converter`] folds the full set
//! into a [`ConversionContext`] holding gateways, virtual hosts, ordered HTTP routes, and traffic
//! policies keyed by host or backend service.
//!
//! Conversion is deterministic: resources are ordered by creation timestamp (then namespace and
//! name) before any builder runs, so conflicts between ingresses are always resolved in favor of
//! the oldest resource.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotations;
mod class;
mod config;
pub mod convert;
mod defaults;
mod ingresses;
mod metrics;
mod services;
mod snapshot;

#[cfg(test)]
mod tests;

pub use self::{
    annotations::{AnnotationError, IngressAnnotations},
    class::{is_eligible, matches_class, matches_namespace},
    config::{ConfigError, IngressConfig},
    convert::{ConversionContext, Converter},
    ingresses::{list_configs, IngressLister, IngressStore, SharedStore},
    metrics::ConversionMetrics,
    services::{PortError, ServiceIndex, ServiceLookup, SharedServices},
    snapshot::{Snapshot, SnapshotStore},
};
use meshgate_ingress_core::DEFAULT_INGRESS_CLASS;
use std::collections::BTreeMap;

/// Holds cluster-wide controller settings.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    /// Distinguishes resources converted by this controller from those of controllers watching
    /// other clusters. May be empty.
    pub cluster_id: String,

    /// The ingress class claimed by this controller. When empty, every ingress is claimed.
    pub ingress_class: String,

    /// Restricts the controller to a single namespace.
    pub watch_namespace: Option<String>,

    /// Labels selecting the gateway workloads that serve converted listeners. Empty selects
    /// none explicitly.
    pub gateway_selector: BTreeMap<String, String>,

    pub cluster_domain: String,
}

// === impl ClusterInfo ===

impl ClusterInfo {
    pub fn service_fqdn(&self, namespace: &str, name: &str) -> String {
        format!("{name}.{namespace}.svc.{}", self.cluster_domain)
    }

    /// Builds the gateway credential reference for a TLS secret.
    pub fn credential_name(&self, namespace: &str, secret: &str) -> String {
        format!(
            "kubernetes-ingress://{}",
            join_path(&[&self.cluster_id, namespace, secret])
        )
    }

    /// Builds the secret name recorded in the domain cache.
    pub fn secret_path(&self, namespace: &str, secret: &str) -> String {
        join_path(&[&self.cluster_id, namespace, secret])
    }
}

impl Default for ClusterInfo {
    fn default() -> Self {
        Self {
            cluster_id: String::new(),
            ingress_class: DEFAULT_INGRESS_CLASS.to_string(),
            watch_namespace: None,
            gateway_selector: BTreeMap::new(),
            cluster_domain: "cluster.local".to_string(),
        }
    }
}

fn join_path(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}
