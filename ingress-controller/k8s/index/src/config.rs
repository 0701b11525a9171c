use crate::{defaults, AnnotationError, IngressAnnotations};
use meshgate_ingress_k8s_api::{Ingress, IngressSpec, ResourceExt, ResourceId, Time};
use std::{cmp::Ordering, collections::BTreeMap};

/// A validated copy of an ingress with its optional fields defaulted.
///
/// The cached ingress is never mutated; conversion always works on this copy.
#[derive(Clone, Debug, PartialEq)]
pub struct IngressConfig {
    pub id: ResourceId,
    pub annotations: IngressAnnotations,
    pub labels: BTreeMap<String, String>,
    pub creation_timestamp: Option<Time>,
    pub spec: IngressSpec,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ingress {0} has no namespace")]
    MissingNamespace(String),

    #[error("invalid annotations: {0}")]
    Annotation(#[from] AnnotationError),
}

// === impl IngressConfig ===

impl IngressConfig {
    pub fn from_ingress(ingress: &Ingress) -> Result<Self, ConfigError> {
        let id = ResourceId::of(ingress)
            .ok_or_else(|| ConfigError::MissingNamespace(ingress.name_unchecked()))?;
        let annotations = IngressAnnotations::parse(&id.namespace, ingress.annotations())?;

        let mut spec = ingress.spec.clone().unwrap_or_default();
        defaults::apply(&mut spec, annotations.needs_regex_match());

        Ok(Self {
            id,
            annotations,
            labels: ingress.labels().clone(),
            creation_timestamp: ingress.metadata.creation_timestamp.clone(),
            spec,
        })
    }

    /// Returns true if the ingress declares neither rules nor a default backend.
    pub fn is_empty(&self) -> bool {
        self.spec.rules.as_ref().map_or(true, Vec::is_empty) && self.spec.default_backend.is_none()
    }

    /// Orders configs by creation time, then namespace and name, so that the oldest resource
    /// claims contested hosts and paths.
    pub fn cmp_age(&self, other: &Self) -> Ordering {
        self.creation_timestamp
            .cmp(&other.creation_timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}
