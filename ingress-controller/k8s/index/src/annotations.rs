//! Typed ingress annotations.
//!
//! Annotations are accepted under either the `meshgate.io/` prefix or the ingress-nginx
//! compatible `nginx.ingress.kubernetes.io/` prefix. When both are set, the `meshgate.io/` value
//! wins.

use http::header::{HeaderName, InvalidHeaderName};
use meshgate_ingress_core::traffic_policy::{HashKey, LoadBalancer};
use meshgate_ingress_k8s_api::ResourceId;
use std::{collections::BTreeMap, num::ParseIntError, str::ParseBoolError};

const PREFIXES: [&str; 2] = ["meshgate.io/", "nginx.ingress.kubernetes.io/"];

const DEFAULT_WEIGHT_TOTAL: u32 = 100;

/// The configuration carried by an ingress's annotations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngressAnnotations {
    pub canary: Option<Canary>,
    pub use_regex: bool,
    pub app_root: Option<String>,
    pub auth: Option<Auth>,
    pub load_balancer: Option<LoadBalancer>,
    pub upstream_tls: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canary {
    pub matcher: Option<CanaryMatch>,
    pub weight: u32,
    pub weight_total: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CanaryMatch {
    Header {
        name: HeaderName,
        value: HeaderValueMatch,
    },
    Cookie(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderValueMatch {
    /// Matches requests that set the header to `always`.
    Always,
    Exact(String),
    Pattern(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CanaryKind {
    Header,
    Weight,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Auth {
    pub kind: AuthKind,
    pub secret: ResourceId,
    pub realm: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AuthKind {
    Basic,
}

#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("annotation {key} must be a boolean: {source}")]
    InvalidBool {
        key: &'static str,
        #[source]
        source: ParseBoolError,
    },

    #[error("annotation {key} must be a non-negative integer: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid canary header name {0:?}")]
    InvalidHeaderName(String, #[source] InvalidHeaderName),

    #[error("invalid canary header pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("canary weight {weight} exceeds the total weight {total}")]
    WeightExceedsTotal { weight: u32, total: u32 },

    #[error("unsupported load-balance algorithm {0:?}")]
    UnsupportedLoadBalance(String),

    #[error("unsupported upstream-hash-by value {0:?}")]
    UnsupportedHashKey(String),

    #[error("unsupported auth-type {0:?}")]
    UnsupportedAuthType(String),

    #[error("auth-type requires auth-secret to be set")]
    MissingAuthSecret,

    #[error("invalid auth-secret reference {0:?}")]
    InvalidAuthSecret(String),

    #[error("unsupported backend-protocol {0:?}")]
    UnsupportedBackendProtocol(String),
}

struct Annotations<'a>(&'a BTreeMap<String, String>);

// === impl IngressAnnotations ===

impl IngressAnnotations {
    /// Parses annotations for an ingress in `namespace`.
    pub fn parse(
        namespace: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Self, AnnotationError> {
        let anns = Annotations(annotations);
        Ok(Self {
            canary: parse_canary(&anns)?,
            use_regex: anns.bool("use-regex")?,
            app_root: anns.get("app-root").map(ToString::to_string),
            auth: parse_auth(namespace, &anns)?,
            load_balancer: parse_load_balancer(&anns)?,
            upstream_tls: parse_upstream_tls(&anns)?,
        })
    }

    #[inline]
    pub fn is_canary(&self) -> bool {
        self.canary.is_some()
    }

    /// Header and cookie matches take precedence over weights.
    pub fn canary_kind(&self) -> Option<CanaryKind> {
        let canary = self.canary.as_ref()?;
        if canary.matcher.is_some() {
            return Some(CanaryKind::Header);
        }
        Some(CanaryKind::Weight)
    }

    #[inline]
    pub fn needs_regex_match(&self) -> bool {
        self.use_regex
    }

    pub fn needs_traffic_policy(&self) -> bool {
        self.load_balancer.is_some() || self.upstream_tls
    }
}

fn parse_canary(anns: &Annotations<'_>) -> Result<Option<Canary>, AnnotationError> {
    if !anns.bool("canary")? {
        return Ok(None);
    }

    let matcher = match anns.get("canary-by-header") {
        Some(header) => {
            let name = HeaderName::from_bytes(header.as_bytes())
                .map_err(|e| AnnotationError::InvalidHeaderName(header.to_string(), e))?;
            let value = if let Some(v) = anns.get("canary-by-header-value") {
                HeaderValueMatch::Exact(v.to_string())
            } else if let Some(p) = anns.get("canary-by-header-pattern") {
                regex::Regex::new(p)?;
                HeaderValueMatch::Pattern(p.to_string())
            } else {
                HeaderValueMatch::Always
            };
            Some(CanaryMatch::Header { name, value })
        }
        None => anns
            .get("canary-by-cookie")
            .map(|c| CanaryMatch::Cookie(c.to_string())),
    };

    let weight = anns.u32("canary-weight")?.unwrap_or(0);
    let weight_total = anns
        .u32("canary-weight-total")?
        .unwrap_or(DEFAULT_WEIGHT_TOTAL);
    if weight > weight_total {
        return Err(AnnotationError::WeightExceedsTotal {
            weight,
            total: weight_total,
        });
    }

    Ok(Some(Canary {
        matcher,
        weight,
        weight_total,
    }))
}

fn parse_auth(namespace: &str, anns: &Annotations<'_>) -> Result<Option<Auth>, AnnotationError> {
    let Some(kind) = anns.get("auth-type") else {
        return Ok(None);
    };
    let kind = match kind {
        "basic" => AuthKind::Basic,
        other => return Err(AnnotationError::UnsupportedAuthType(other.to_string())),
    };

    let secret = anns
        .get("auth-secret")
        .ok_or(AnnotationError::MissingAuthSecret)?;
    let secret = match secret.split_once('/') {
        None if !secret.is_empty() => ResourceId::new(namespace, secret),
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
            ResourceId::new(ns, name)
        }
        _ => return Err(AnnotationError::InvalidAuthSecret(secret.to_string())),
    };

    Ok(Some(Auth {
        kind,
        secret,
        realm: anns.get("auth-realm").map(ToString::to_string),
    }))
}

fn parse_load_balancer(anns: &Annotations<'_>) -> Result<Option<LoadBalancer>, AnnotationError> {
    // A hash key implies consistent hashing regardless of the configured algorithm.
    if let Some(key) = anns.get("upstream-hash-by") {
        return parse_hash_key(key).map(|k| Some(LoadBalancer::ConsistentHash(k)));
    }

    anns.get("load-balance")
        .map(|lb| match lb.to_ascii_lowercase().as_str() {
            "round_robin" => Ok(LoadBalancer::RoundRobin),
            "least_conn" => Ok(LoadBalancer::LeastConn),
            "random" => Ok(LoadBalancer::Random),
            _ => Err(AnnotationError::UnsupportedLoadBalance(lb.to_string())),
        })
        .transpose()
}

fn parse_hash_key(key: &str) -> Result<HashKey, AnnotationError> {
    let key = key.trim();
    match key {
        "$request_uri" => return Ok(HashKey::Header(":path".to_string())),
        "$host" => return Ok(HashKey::Header(":authority".to_string())),
        "$remote_addr" => return Ok(HashKey::SourceIp),
        _ => {}
    }

    let named = |prefix: &str| key.strip_prefix(prefix).filter(|n| !n.is_empty());
    if let Some(name) = named("$http_") {
        return Ok(HashKey::Header(name.replace('_', "-")));
    }
    if let Some(name) = named("$cookie_") {
        return Ok(HashKey::Cookie(name.to_string()));
    }
    if let Some(name) = named("$arg_") {
        return Ok(HashKey::QueryParam(name.to_string()));
    }

    Err(AnnotationError::UnsupportedHashKey(key.to_string()))
}

fn parse_upstream_tls(anns: &Annotations<'_>) -> Result<bool, AnnotationError> {
    match anns.get("backend-protocol") {
        None => Ok(false),
        Some(proto) => match proto.to_ascii_uppercase().as_str() {
            "HTTP" | "HTTP2" | "GRPC" => Ok(false),
            "HTTPS" | "GRPCS" => Ok(true),
            _ => Err(AnnotationError::UnsupportedBackendProtocol(
                proto.to_string(),
            )),
        },
    }
}

// === impl Annotations ===

impl<'a> Annotations<'a> {
    fn get(&self, key: &str) -> Option<&'a str> {
        PREFIXES
            .iter()
            .find_map(|prefix| self.0.get(&format!("{prefix}{key}")))
            .map(String::as_str)
    }

    fn bool(&self, key: &'static str) -> Result<bool, AnnotationError> {
        self.get(key)
            .map(|v| v.trim().parse::<bool>())
            .transpose()
            .map(|v| v.unwrap_or(false))
            .map_err(|source| AnnotationError::InvalidBool { key, source })
    }

    fn u32(&self, key: &'static str) -> Result<Option<u32>, AnnotationError> {
        self.get(key)
            .map(|v| v.trim().parse::<u32>())
            .transpose()
            .map_err(|source| AnnotationError::InvalidNumber { key, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn parse(anns: BTreeMap<String, String>) -> Result<IngressAnnotations, AnnotationError> {
        IngressAnnotations::parse("ns-0", &anns)
    }

    #[test]
    fn empty() {
        let anns = parse(BTreeMap::new()).expect("annotations must parse");
        assert_eq!(anns, IngressAnnotations::default());
        assert!(!anns.is_canary());
        assert!(!anns.needs_traffic_policy());
    }

    #[test]
    fn meshgate_prefix_wins() {
        let anns = parse(btreemap! {
            "meshgate.io/use-regex".to_string() => "true".to_string(),
            "nginx.ingress.kubernetes.io/use-regex".to_string() => "false".to_string(),
        })
        .expect("annotations must parse");
        assert!(anns.needs_regex_match());
    }

    #[test]
    fn canary_by_weight() {
        let anns = parse(btreemap! {
            "nginx.ingress.kubernetes.io/canary".to_string() => "true".to_string(),
            "nginx.ingress.kubernetes.io/canary-weight".to_string() => "20".to_string(),
        })
        .expect("annotations must parse");
        assert_eq!(anns.canary_kind(), Some(CanaryKind::Weight));
        assert_eq!(
            anns.canary,
            Some(Canary {
                matcher: None,
                weight: 20,
                weight_total: 100,
            })
        );
    }

    #[test]
    fn canary_header_beats_weight() {
        let anns = parse(btreemap! {
            "meshgate.io/canary".to_string() => "true".to_string(),
            "meshgate.io/canary-weight".to_string() => "20".to_string(),
            "meshgate.io/canary-by-header".to_string() => "X-Canary".to_string(),
            "meshgate.io/canary-by-header-value".to_string() => "yes".to_string(),
        })
        .expect("annotations must parse");
        assert_eq!(anns.canary_kind(), Some(CanaryKind::Header));
        let canary = anns.canary.expect("must be a canary");
        assert_eq!(
            canary.matcher,
            Some(CanaryMatch::Header {
                name: HeaderName::from_static("x-canary"),
                value: HeaderValueMatch::Exact("yes".to_string()),
            })
        );
    }

    #[test]
    fn canary_ignored_unless_enabled() {
        let anns = parse(btreemap! {
            "meshgate.io/canary-weight".to_string() => "20".to_string(),
        })
        .expect("annotations must parse");
        assert!(!anns.is_canary());
        assert_eq!(anns.canary_kind(), None);
    }

    #[test]
    fn rejects_weight_above_total() {
        let err = parse(btreemap! {
            "meshgate.io/canary".to_string() => "true".to_string(),
            "meshgate.io/canary-weight".to_string() => "20".to_string(),
            "meshgate.io/canary-weight-total".to_string() => "10".to_string(),
        })
        .expect_err("weight must not exceed total");
        assert!(matches!(
            err,
            AnnotationError::WeightExceedsTotal {
                weight: 20,
                total: 10
            }
        ));
    }

    #[test]
    fn rejects_invalid_values() {
        for (key, value) in [
            ("meshgate.io/canary", "yes"),
            ("meshgate.io/load-balance", "fastest"),
            ("meshgate.io/upstream-hash-by", "$nope"),
            ("meshgate.io/backend-protocol", "FTP"),
            ("meshgate.io/auth-type", "digest"),
        ] {
            let anns = btreemap! { key.to_string() => value.to_string() };
            assert!(parse(anns).is_err(), "{key}={value} must be rejected");
        }
    }

    #[test]
    fn auth_secret_reference() {
        let anns = parse(btreemap! {
            "meshgate.io/auth-type".to_string() => "basic".to_string(),
            "meshgate.io/auth-secret".to_string() => "creds".to_string(),
        })
        .expect("annotations must parse");
        assert_eq!(
            anns.auth.map(|a| a.secret),
            Some(ResourceId::new("ns-0", "creds"))
        );

        let anns = parse(btreemap! {
            "meshgate.io/auth-type".to_string() => "basic".to_string(),
            "meshgate.io/auth-secret".to_string() => "other/creds".to_string(),
        })
        .expect("annotations must parse");
        assert_eq!(
            anns.auth.map(|a| a.secret),
            Some(ResourceId::new("other", "creds"))
        );

        assert!(matches!(
            parse(btreemap! {
                "meshgate.io/auth-type".to_string() => "basic".to_string(),
            }),
            Err(AnnotationError::MissingAuthSecret)
        ));
    }

    #[test]
    fn traffic_policy_annotations() {
        let anns = parse(btreemap! {
            "meshgate.io/upstream-hash-by".to_string() => "$http_x_user_id".to_string(),
        })
        .expect("annotations must parse");
        assert_eq!(
            anns.load_balancer,
            Some(LoadBalancer::ConsistentHash(HashKey::Header(
                "x-user-id".to_string()
            )))
        );
        assert!(anns.needs_traffic_policy());

        let anns = parse(btreemap! {
            "meshgate.io/backend-protocol".to_string() => "https".to_string(),
        })
        .expect("annotations must parse");
        assert!(anns.upstream_tls);
        assert!(anns.needs_traffic_policy());
    }
}
