use kube::ResourceExt;
use std::fmt;

/// Identifies a namespaced resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns the identity of a namespaced resource, or `None` if the resource has no
    /// namespace.
    pub fn of<T: ResourceExt>(resource: &T) -> Option<Self> {
        let namespace = resource.namespace()?;
        Some(Self::new(namespace, resource.name_unchecked()))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
