use ahash::AHashMap as HashMap;
use meshgate_ingress_k8s_api::{Ingress, IngressSpec, ResourceExt, ResourceId};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// The fields of an ingress that affect conversion, as of the last time it was processed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub spec: Option<IngressSpec>,
}

/// Remembers the last processed state of each eligible ingress.
///
/// Deletions are handled from this store, since the deleted resource is no longer available
/// from the cache. A key is present if and only if the ingress was eligible when last
/// processed.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: RwLock<HashMap<ResourceId, Snapshot>>,
}

// === impl Snapshot ===

impl Snapshot {
    pub fn of(ingress: &Ingress) -> Self {
        Self {
            annotations: ingress.annotations().clone(),
            labels: ingress.labels().clone(),
            spec: ingress.spec.clone(),
        }
    }

    /// Names the first field that differs from `other`, if any.
    pub fn changed_field(&self, other: &Self) -> Option<&'static str> {
        if self.annotations != other.annotations {
            return Some("annotations");
        }
        if self.labels != other.labels {
            return Some("labels");
        }
        if self.spec != other.spec {
            return Some("spec");
        }
        None
    }
}

// === impl SnapshotStore ===

impl SnapshotStore {
    pub fn get(&self, id: &ResourceId) -> Option<Snapshot> {
        self.snapshots.read().get(id).cloned()
    }

    /// Stores a snapshot, returning the one it replaced.
    pub fn put(&self, id: ResourceId, snapshot: Snapshot) -> Option<Snapshot> {
        self.snapshots.write().insert(id, snapshot)
    }

    pub fn remove(&self, id: &ResourceId) -> Option<Snapshot> {
        self.snapshots.write().remove(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.snapshots.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}
