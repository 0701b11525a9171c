use crate::BackendService;
use std::collections::BTreeMap;

/// The path semantics a route was declared with.
///
/// The declaration order is also the order in which routes are evaluated: exact matches must be
/// tried before prefixes, and prefixes before regular expressions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathType {
    Exact,
    Prefix,
    Regex,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StringMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpMatchRequest {
    pub uri: Option<StringMatch>,
    pub headers: BTreeMap<String, StringMatch>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub namespace: String,
    pub service: String,
    /// The fully-qualified service host name.
    pub host: String,
    pub port: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRouteDestination {
    pub destination: Destination,
    pub weight: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpRoute {
    pub name: String,
    pub matches: Vec<HttpMatchRequest>,
    pub route: Vec<HttpRouteDestination>,
}

// === impl PathType ===

impl PathType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Regex => "regex",
        }
    }
}

// === impl HttpRouteDestination ===

impl HttpRouteDestination {
    pub fn backend(&self) -> BackendService {
        BackendService {
            namespace: self.destination.namespace.clone(),
            name: self.destination.service.clone(),
            port: self.destination.port,
            weight: self.weight,
        }
    }
}

// === impl HttpRoute ===

impl HttpRoute {
    pub fn backends(&self) -> Vec<BackendService> {
        self.route.iter().map(HttpRouteDestination::backend).collect()
    }

    pub fn total_weight(&self) -> u32 {
        self.route.iter().map(|d| d.weight).sum()
    }
}
