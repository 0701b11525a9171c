//! Describes the downstream configuration kinds that are regenerated when an ingress changes.

use std::collections::BTreeMap;

/// Marks a change notification so that the distribution layer pushes it without comparing
/// payloads.
pub const ALWAYS_PUSH_LABEL: &str = "meshgate.io/always-push";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKind {
    Gateway,
    VirtualService,
    DestinationRule,
    EnvoyFilter,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Update,
    Delete,
}

/// The minimal metadata handed to change handlers. The payload itself is recomputed by the
/// distribution layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigMeta {
    pub kind: ConfigKind,
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

// === impl ConfigKind ===

impl ConfigKind {
    /// All kinds, in the order handlers are notified.
    pub const ALL: [ConfigKind; 4] = [
        ConfigKind::DestinationRule,
        ConfigKind::VirtualService,
        ConfigKind::EnvoyFilter,
        ConfigKind::Gateway,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::VirtualService => "virtualservice",
            Self::DestinationRule => "destinationrule",
            Self::EnvoyFilter => "envoyfilter",
        }
    }
}

// === impl ConfigMeta ===

impl ConfigMeta {
    /// Builds the notification metadata for the `kind` derived from an ingress.
    pub fn always_push(kind: ConfigKind, namespace: &str, ingress: &str) -> Self {
        Self {
            kind,
            name: format!("{}-{}", ingress, kind.as_str()),
            namespace: namespace.to_string(),
            labels: Some((ALWAYS_PUSH_LABEL.to_string(), "true".to_string()))
                .into_iter()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_push_meta() {
        let meta = ConfigMeta::always_push(ConfigKind::VirtualService, "ns-0", "web");
        assert_eq!(meta.name, "web-virtualservice");
        assert_eq!(meta.namespace, "ns-0");
        assert_eq!(
            meta.labels.get(ALWAYS_PUSH_LABEL).map(String::as_str),
            Some("true")
        );
    }
}
