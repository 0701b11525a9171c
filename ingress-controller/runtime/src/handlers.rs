use ahash::AHashMap as HashMap;
use meshgate_ingress_core::config::{ConfigKind, ConfigMeta, EventKind};
use meshgate_ingress_k8s_api::ResourceId;
use std::{fmt, sync::Arc};

/// Observes a change to a derived configuration. Handlers receive the previous and the current
/// metadata, which are identical for changes derived from ingresses.
pub type Handler = Arc<dyn Fn(&ConfigMeta, &ConfigMeta, EventKind) + Send + Sync>;

/// Handlers by configuration kind. Immutable once built.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<HashMap<ConfigKind, Vec<Handler>>>,
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<ConfigKind, Vec<Handler>>,
}

// === impl HandlerRegistry ===

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Notifies every handler of every kind that the configs derived from `id` changed.
    ///
    /// Returns the number of handlers invoked.
    pub fn notify(&self, id: &ResourceId, event: EventKind) -> usize {
        let mut invoked = 0;
        for kind in ConfigKind::ALL {
            let Some(handlers) = self.handlers.get(&kind) else {
                continue;
            };
            let meta = ConfigMeta::always_push(kind, &id.namespace, &id.name);
            for handler in handlers {
                handler(&meta, &meta, event);
                invoked += 1;
            }
        }
        tracing::debug!(ns = %id.namespace, name = %id.name, ?event, handlers = invoked, "Notified handlers");
        invoked
    }

    pub fn len(&self, kind: ConfigKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in ConfigKind::ALL {
            map.entry(&kind.as_str(), &self.len(kind));
        }
        map.finish()
    }
}

// === impl HandlerRegistryBuilder ===

impl HandlerRegistryBuilder {
    pub fn register(
        mut self,
        kind: ConfigKind,
        handler: impl Fn(&ConfigMeta, &ConfigMeta, EventKind) + Send + Sync + 'static,
    ) -> Self {
        self.handlers
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Registers one handler for every kind.
    pub fn register_all(
        mut self,
        handler: impl Fn(&ConfigMeta, &ConfigMeta, EventKind) + Send + Sync + 'static,
    ) -> Self {
        let handler: Handler = Arc::new(handler);
        for kind in ConfigKind::ALL {
            self.handlers.entry(kind).or_default().push(handler.clone());
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}
