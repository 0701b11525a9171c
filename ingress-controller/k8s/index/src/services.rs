use ahash::AHashMap as HashMap;
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use meshgate_ingress_k8s_api::{ResourceExt, Service};
use parking_lot::RwLock;
use std::sync::Arc;

pub type SharedServices = Arc<RwLock<ServiceIndex>>;

/// Resolves named service ports.
pub trait ServiceLookup {
    fn resolve_named_port(&self, namespace: &str, service: &str, port: &str)
        -> Result<i32, PortError>;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("service {namespace}/{name} not found")]
    ServiceNotFound { namespace: String, name: String },

    #[error("service {namespace}/{name} has no port named {port:?}")]
    PortNotFound {
        namespace: String,
        name: String,
        port: String,
    },
}

/// Indexes the port names of every service.
#[derive(Debug, Default)]
pub struct ServiceIndex {
    by_ns: HashMap<String, HashMap<String, Vec<(String, i32)>>>,
    synced: bool,
}

// === impl ServiceIndex ===

impl ServiceIndex {
    pub fn shared() -> SharedServices {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn has_synced(&self) -> bool {
        self.synced
    }

    fn remove(&mut self, namespace: &str, name: &str) {
        if let Some(services) = self.by_ns.get_mut(namespace) {
            services.remove(name);
            if services.is_empty() {
                self.by_ns.remove(namespace);
            }
        }
    }
}

impl ServiceLookup for ServiceIndex {
    fn resolve_named_port(
        &self,
        namespace: &str,
        service: &str,
        port: &str,
    ) -> Result<i32, PortError> {
        let ports = self
            .by_ns
            .get(namespace)
            .and_then(|services| services.get(service))
            .ok_or_else(|| PortError::ServiceNotFound {
                namespace: namespace.to_string(),
                name: service.to_string(),
            })?;

        // Unnamed ports are indexed with an empty name, so an empty reference resolves to the
        // first unnamed port.
        ports
            .iter()
            .find(|(name, _)| name == port)
            .map(|(_, number)| *number)
            .ok_or_else(|| PortError::PortNotFound {
                namespace: namespace.to_string(),
                name: service.to_string(),
                port: port.to_string(),
            })
    }
}

impl<T: ServiceLookup> ServiceLookup for Arc<RwLock<T>> {
    fn resolve_named_port(
        &self,
        namespace: &str,
        service: &str,
        port: &str,
    ) -> Result<i32, PortError> {
        self.read().resolve_named_port(namespace, service, port)
    }
}

impl IndexNamespacedResource<Service> for ServiceIndex {
    fn apply(&mut self, service: Service) {
        let Some(namespace) = service.namespace() else {
            return;
        };
        let name = service.name_unchecked();
        let ports = service
            .spec
            .into_iter()
            .flat_map(|spec| spec.ports.into_iter().flatten())
            .map(|p| (p.name.unwrap_or_default(), p.port))
            .collect();
        self.by_ns.entry(namespace).or_default().insert(name, ports);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.remove(&namespace, &name);
    }

    fn reset(&mut self, services: Vec<Service>, deleted: NamespacedRemoved) {
        for (namespace, names) in deleted {
            for name in names {
                self.remove(&namespace, &name);
            }
        }
        for service in services {
            self.apply(service);
        }
        self.synced = true;
    }
}
