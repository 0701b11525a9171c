use crate::{is_eligible, ClusterInfo, ConversionMetrics, IngressConfig};
use ahash::AHashMap as HashMap;
use anyhow::Result;
use kubert::index::{ClusterRemoved, NamespacedRemoved};
use meshgate_ingress_core::Event;
use meshgate_ingress_k8s_api::{Ingress, IngressClass, ResourceExt, ResourceId};
use parking_lot::RwLock;
use std::sync::Arc;

pub type SharedStore = Arc<RwLock<IngressStore>>;

/// Read access to the cached ingresses and ingress classes.
pub trait IngressLister {
    /// Returns the cached ingress, or `None` if it does not exist.
    fn ingress(&self, id: &ResourceId) -> Result<Option<Ingress>>;

    fn ingress_class(&self, name: &str) -> Result<Option<IngressClass>>;

    fn ingresses(&self) -> Vec<Ingress>;

    /// Returns true once the initial listing of every watched kind has been observed.
    fn has_synced(&self) -> bool;
}

/// Caches the `Ingress` and `IngressClass` resources observed from the API.
#[derive(Debug, Default)]
pub struct IngressStore {
    ingresses: HashMap<ResourceId, Ingress>,
    classes: HashMap<String, IngressClass>,
    ingresses_synced: bool,
    classes_synced: bool,
}

/// Returns the validated, defaulted configs of every eligible ingress, oldest first.
///
/// Ingresses that fail validation are counted and skipped.
pub fn list_configs<L: IngressLister + ?Sized>(
    lister: &L,
    cluster: &ClusterInfo,
    metrics: &ConversionMetrics,
) -> Vec<Arc<IngressConfig>> {
    let mut configs = Vec::new();
    for ingress in lister.ingresses() {
        let ns = ingress.namespace().unwrap_or_default();
        let name = ingress.name_unchecked();
        match is_eligible(lister, &ingress, cluster) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(error) => {
                tracing::warn!(%ns, %name, %error, "Failed to check ingress eligibility");
                continue;
            }
        }

        match IngressConfig::from_ingress(&ingress) {
            Ok(config) => configs.push(Arc::new(config)),
            Err(error) => {
                tracing::warn!(%ns, %name, %error, "Skipping invalid ingress");
                metrics.record_invalid(&cluster.cluster_id, Event::Unknown);
            }
        }
    }

    configs.sort_by(|a, b| a.cmp_age(b));
    metrics.set_ingresses(&cluster.cluster_id, configs.len());
    configs
}

// === impl IngressStore ===

impl IngressStore {
    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::default()))
    }
}

impl IngressLister for IngressStore {
    fn ingress(&self, id: &ResourceId) -> Result<Option<Ingress>> {
        Ok(self.ingresses.get(id).cloned())
    }

    fn ingress_class(&self, name: &str) -> Result<Option<IngressClass>> {
        Ok(self.classes.get(name).cloned())
    }

    fn ingresses(&self) -> Vec<Ingress> {
        self.ingresses.values().cloned().collect()
    }

    fn has_synced(&self) -> bool {
        self.ingresses_synced && self.classes_synced
    }
}

impl<L: IngressLister> IngressLister for Arc<RwLock<L>> {
    fn ingress(&self, id: &ResourceId) -> Result<Option<Ingress>> {
        self.read().ingress(id)
    }

    fn ingress_class(&self, name: &str) -> Result<Option<IngressClass>> {
        self.read().ingress_class(name)
    }

    fn ingresses(&self) -> Vec<Ingress> {
        self.read().ingresses()
    }

    fn has_synced(&self) -> bool {
        self.read().has_synced()
    }
}

impl kubert::index::IndexNamespacedResource<Ingress> for IngressStore {
    fn apply(&mut self, ingress: Ingress) {
        let Some(id) = ResourceId::of(&ingress) else {
            tracing::warn!(name = %ingress.name_unchecked(), "Ignoring ingress without a namespace");
            return;
        };
        tracing::trace!(ns = %id.namespace, name = %id.name, "Caching ingress");
        self.ingresses.insert(id, ingress);
    }

    fn delete(&mut self, namespace: String, name: String) {
        tracing::trace!(ns = %namespace, %name, "Removing ingress");
        self.ingresses.remove(&ResourceId::new(namespace, name));
    }

    fn reset(&mut self, ingresses: Vec<Ingress>, deleted: NamespacedRemoved) {
        for (namespace, names) in deleted {
            for name in names {
                self.ingresses
                    .remove(&ResourceId::new(namespace.clone(), name));
            }
        }
        for ingress in ingresses {
            <Self as kubert::index::IndexNamespacedResource<Ingress>>::apply(self, ingress);
        }
        self.ingresses_synced = true;
    }
}

impl kubert::index::IndexClusterResource<IngressClass> for IngressStore {
    fn apply(&mut self, class: IngressClass) {
        self.classes.insert(class.name_unchecked(), class);
    }

    fn delete(&mut self, name: String) {
        self.classes.remove(&name);
    }

    fn reset(&mut self, classes: Vec<IngressClass>, deleted: ClusterRemoved) {
        for name in deleted {
            self.classes.remove(&name);
        }
        for class in classes {
            <Self as kubert::index::IndexClusterResource<IngressClass>>::apply(self, class);
        }
        self.classes_synced = true;
    }
}
