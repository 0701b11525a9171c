use std::fmt;

/// Identifies a backend service port.
///
/// The port is always numeric: named ports must be resolved against the live service before a
/// key can be built.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub namespace: String,
    pub name: String,
    pub port: i32,
}

/// A weighted backend referenced by a route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendService {
    pub namespace: String,
    pub name: String,
    pub port: u32,
    pub weight: u32,
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.name, self.port)
    }
}
