#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod config;
mod event;
pub mod gateway;
pub mod http_route;
mod service;
pub mod traffic_policy;

pub use self::{
    event::Event,
    service::{BackendService, ServiceKey},
};

/// The ingress class claimed when no class is configured explicitly.
pub const DEFAULT_INGRESS_CLASS: &str = "meshgate";

/// Host used for rules and TLS blocks that do not name one.
pub const DEFAULT_HOST: &str = "*";

/// Path used for HTTP paths that do not name one.
pub const DEFAULT_PATH: &str = "/";
