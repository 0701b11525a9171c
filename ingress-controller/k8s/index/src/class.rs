use crate::{ClusterInfo, IngressLister};
use anyhow::{Context, Result};
use meshgate_ingress_core::DEFAULT_INGRESS_CLASS;
use meshgate_ingress_k8s_api::{Ingress, IngressClass, ResourceExt, INGRESS_CLASS_ANNOTATION};

/// Returns true if the ingress is claimed by this controller's class and lives in a watched
/// namespace.
///
/// Fails only when the referenced `IngressClass` cannot be read. A missing class is not an
/// error.
pub fn is_eligible<L: IngressLister + ?Sized>(
    lister: &L,
    ingress: &Ingress,
    cluster: &ClusterInfo,
) -> Result<bool> {
    let class_name = ingress
        .spec
        .as_ref()
        .and_then(|s| s.ingress_class_name.as_deref());
    let class = match class_name {
        Some(name) => lister
            .ingress_class(name)
            .with_context(|| format!("failed to get ingress class {name}"))?,
        None => None,
    };

    Ok(matches_class(ingress, class.as_ref(), &cluster.ingress_class)
        && matches_namespace(ingress, cluster.watch_namespace.as_deref()))
}

/// Decides whether the ingress belongs to the `configured` class.
///
/// The legacy class annotation takes precedence over a resolved `IngressClass`, which takes
/// precedence over an unresolved `ingressClassName`. An empty configured class claims every
/// ingress. The default class also claims ingresses that do not name any class.
pub fn matches_class(ingress: &Ingress, class: Option<&IngressClass>, configured: &str) -> bool {
    if configured.is_empty() {
        return true;
    }

    if let Some(annotated) = ingress.annotations().get(INGRESS_CLASS_ANNOTATION) {
        if configured == DEFAULT_INGRESS_CLASS {
            return annotated.is_empty() || annotated == DEFAULT_INGRESS_CLASS;
        }
        return annotated == configured;
    }

    if let Some(class) = class {
        return class.name_unchecked() == configured;
    }

    let named = ingress
        .spec
        .as_ref()
        .and_then(|s| s.ingress_class_name.as_deref());
    if configured == DEFAULT_INGRESS_CLASS {
        return named.map_or(true, |n| n.is_empty() || n == DEFAULT_INGRESS_CLASS);
    }
    named == Some(configured)
}

pub fn matches_namespace(ingress: &Ingress, watch_namespace: Option<&str>) -> bool {
    match watch_namespace {
        None | Some("") => true,
        Some(ns) => ingress.namespace().as_deref() == Some(ns),
    }
}
