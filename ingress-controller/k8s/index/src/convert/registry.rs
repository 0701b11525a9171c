use super::WrapperHttpRoute;
use meshgate_ingress_core::{gateway::Protocol, http_route::PathType, BackendService, Event};
use meshgate_ingress_k8s_api::ResourceId;
use std::collections::BTreeMap;

/// Records the outcome of every candidate route.
///
/// Accepted routes are grouped by host. Rejected routes are kept with a reference to the
/// ingress that won the conflict, if any.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    valid: BTreeMap<String, Vec<RouteEntry>>,
    invalid: Vec<RouteEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    pub route_name: String,
    pub host: String,
    pub path_type: PathType,
    pub path: String,
    pub source: ResourceId,
    pub previous: Option<ResourceId>,
    pub event: Event,
    pub port_name: Option<String>,
    pub services: Vec<BackendService>,
}

/// Records the protocol and TLS secret claimed for every host.
#[derive(Debug, Default)]
pub struct DomainCache {
    pub valid: BTreeMap<String, DomainEntry>,
    pub invalid: Vec<DomainEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainEntry {
    pub host: String,
    pub protocol: Protocol,
    pub secret_name: Option<String>,
    pub source: ResourceId,
    pub previous: Option<ResourceId>,
    pub event: Event,
}

// === impl RouteRegistry ===

impl RouteRegistry {
    /// Starts an entry for a candidate route. The entry is not recorded until it is added.
    pub fn new_entry(route: &WrapperHttpRoute) -> RouteEntry {
        RouteEntry {
            route_name: route.route.name.clone(),
            host: route.host.clone(),
            path_type: route.origin_path_type,
            path: route.origin_path.clone(),
            source: route.source.clone(),
            previous: None,
            event: Event::Normal,
            port_name: None,
            services: route.route.backends(),
        }
    }

    pub fn add(&mut self, entry: RouteEntry) {
        if entry.event.is_normal() {
            self.valid.entry(entry.host.clone()).or_default().push(entry);
        } else {
            self.invalid.push(entry);
        }
    }

    pub fn new_and_add(&mut self, route: &WrapperHttpRoute) {
        self.add(Self::new_entry(route));
    }

    /// Removes the accepted entry for `route`.
    pub fn delete(&mut self, route: &WrapperHttpRoute) {
        if let Some(entries) = self.valid.get_mut(&route.host) {
            entries.retain(|e| e.route_name != route.route.name);
            if entries.is_empty() {
                self.valid.remove(&route.host);
            }
        }
    }

    /// Refreshes the backends of the accepted entry for `route`.
    pub fn update(&mut self, route: &WrapperHttpRoute) {
        let entry = self
            .valid
            .get_mut(&route.host)
            .and_then(|entries| entries.iter_mut().find(|e| e.route_name == route.route.name));
        if let Some(entry) = entry {
            entry.services = route.route.backends();
        }
    }

    pub fn valid(&self, host: &str) -> &[RouteEntry] {
        self.valid.get(host).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn invalid(&self) -> &[RouteEntry] {
        &self.invalid
    }
}

// === impl DomainEntry ===

impl DomainEntry {
    pub(super) fn http(host: &str, source: &ResourceId) -> Self {
        Self {
            host: host.to_string(),
            protocol: Protocol::Http,
            secret_name: None,
            source: source.clone(),
            previous: None,
            event: Event::Normal,
        }
    }
}
