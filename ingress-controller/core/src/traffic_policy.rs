#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadBalancer {
    RoundRobin,
    LeastConn,
    Random,
    ConsistentHash(HashKey),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashKey {
    Header(String),
    Cookie(String),
    QueryParam(String),
    SourceIp,
}

/// Connection settings applied to a single backend service port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrafficPolicy {
    pub port: u32,
    pub load_balancer: Option<LoadBalancer>,
    /// Originate TLS to the backend.
    pub upstream_tls: bool,
}
