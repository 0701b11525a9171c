use std::collections::BTreeMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Https,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    pub number: u32,
    pub protocol: Protocol,
    pub name: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TlsMode {
    Simple,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerTls {
    pub mode: TlsMode,
    pub credential_name: String,
}

/// A single listener on a gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Server {
    pub port: Port,
    pub hosts: Vec<String>,
    pub tls: Option<ServerTls>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Gateway {
    pub selector: BTreeMap<String, String>,
    pub servers: Vec<Server>,
}

// === impl Protocol ===

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
        }
    }
}

// === impl Gateway ===

impl Gateway {
    /// Returns true if the gateway already has a TLS listener.
    pub fn is_https(&self) -> bool {
        self.servers.iter().any(|s| s.tls.is_some())
    }
}
