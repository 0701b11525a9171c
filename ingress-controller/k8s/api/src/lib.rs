#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod resource_id;

pub use self::resource_id::ResourceId;
pub use k8s_openapi::{
    api::{
        core::v1::{Service, ServicePort, ServiceSpec},
        networking::v1::{
            HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressClass,
            IngressClassSpec, IngressRule, IngressServiceBackend, IngressSpec, IngressTLS,
            ServiceBackendPort,
        },
    },
    apimachinery::pkg::apis::meta::v1::Time,
};
pub use kube::{
    api::{ObjectMeta, ResourceExt},
    Client, Resource,
};

/// The legacy annotation used to select an ingress controller before `ingressClassName` existed.
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

// Values of `HTTPIngressPath::path_type`.
pub const PATH_TYPE_PREFIX: &str = "Prefix";
pub const PATH_TYPE_EXACT: &str = "Exact";
