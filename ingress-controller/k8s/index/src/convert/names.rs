use meshgate_ingress_core::{http_route::PathType, DEFAULT_HOST};
use sha2::{Digest, Sha256};

/// Joins the non-empty parts of a generated resource name.
pub fn converted_name(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("-")
}

/// Converts a host into a form usable in generated names.
pub fn clean_host(host: &str) -> String {
    if host == DEFAULT_HOST {
        return "global".to_string();
    }
    let host = if host.starts_with('*') {
        host.replace('*', "global-")
    } else {
        host.to_string()
    };
    host.replace('.', "-")
}

/// A short, stable digest of a route's path, used to keep route names unique within a host.
pub(super) fn path_hash(path_type: PathType, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(path.as_bytes());
    let mut hash = hex::encode(hasher.finalize());
    hash.truncate(16);
    hash
}
