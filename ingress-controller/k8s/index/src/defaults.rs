use meshgate_ingress_core::{DEFAULT_HOST, DEFAULT_PATH};
use meshgate_ingress_k8s_api::{IngressSpec, PATH_TYPE_EXACT, PATH_TYPE_PREFIX};

/// Fills in the optional fields of an ingress spec that the converters rely on.
///
/// - TLS blocks without hosts apply to every host.
/// - Rules with HTTP paths but no host apply to every host.
/// - Paths default to `/`.
/// - Paths without a type are treated as prefixes. Unless regex matching is enabled, trailing
///   glob-like suffixes (`.*` and `/*`) are trimmed from them.
/// - `ImplementationSpecific` paths are treated as prefixes.
pub(crate) fn apply(spec: &mut IngressSpec, use_regex: bool) {
    for tls in spec.tls.iter_mut().flatten() {
        if tls.hosts.as_ref().map_or(true, Vec::is_empty) {
            tls.hosts = Some(vec![DEFAULT_HOST.to_string()]);
        }
    }

    for rule in spec.rules.iter_mut().flatten() {
        let Some(http) = rule.http.as_mut() else {
            continue;
        };

        if rule.host.as_deref().map_or(true, str::is_empty) {
            rule.host = Some(DEFAULT_HOST.to_string());
        }

        for path in &mut http.paths {
            if path.path.as_deref().map_or(true, str::is_empty) {
                path.path = Some(DEFAULT_PATH.to_string());
            }

            if path.path_type.is_empty() {
                path.path_type = PATH_TYPE_PREFIX.to_string();
                if !use_regex {
                    if let Some(p) = path.path.as_mut() {
                        trim_glob(p);
                    }
                }
            }

            // `ImplementationSpecific` is served as a prefix match.
            if path.path_type != PATH_TYPE_EXACT {
                path.path_type = PATH_TYPE_PREFIX.to_string();
            }
        }
    }
}

fn trim_glob(path: &mut String) {
    if let Some(trimmed) = path.strip_suffix(".*") {
        *path = trimmed.to_string();
    }
    if let Some(trimmed) = path.strip_suffix("/*") {
        *path = trimmed.to_string();
    }
    if path.is_empty() {
        *path = DEFAULT_PATH.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshgate_ingress_k8s_api::{HTTPIngressPath, HTTPIngressRuleValue, IngressRule, IngressTLS};

    fn mk_path(path: Option<&str>, path_type: &str) -> HTTPIngressPath {
        HTTPIngressPath {
            path: path.map(ToString::to_string),
            path_type: path_type.to_string(),
            ..Default::default()
        }
    }

    fn mk_spec(paths: Vec<HTTPIngressPath>) -> IngressSpec {
        IngressSpec {
            rules: Some(vec![IngressRule {
                host: None,
                http: Some(HTTPIngressRuleValue { paths }),
            }]),
            tls: Some(vec![IngressTLS {
                hosts: None,
                secret_name: Some("cert".to_string()),
            }]),
            ..Default::default()
        }
    }

    fn paths(spec: &IngressSpec) -> Vec<(String, String)> {
        spec.rules
            .iter()
            .flatten()
            .flat_map(|r| r.http.iter().flat_map(|h| h.paths.iter()))
            .map(|p| (p.path.clone().unwrap_or_default(), p.path_type.clone()))
            .collect()
    }

    #[test]
    fn fills_hosts_and_paths() {
        let mut spec = mk_spec(vec![
            mk_path(None, ""),
            mk_path(Some("/api"), "ImplementationSpecific"),
            mk_path(Some("/exact"), "Exact"),
        ]);
        apply(&mut spec, false);

        let rule = &spec.rules.as_ref().expect("rules")[0];
        assert_eq!(rule.host.as_deref(), Some("*"));
        assert_eq!(
            spec.tls.as_ref().expect("tls")[0].hosts,
            Some(vec!["*".to_string()])
        );
        assert_eq!(
            paths(&spec),
            vec![
                ("/".to_string(), "Prefix".to_string()),
                ("/api".to_string(), "Prefix".to_string()),
                ("/exact".to_string(), "Exact".to_string()),
            ]
        );
    }

    #[test]
    fn trims_globs_unless_regex() {
        let mut spec = mk_spec(vec![mk_path(Some("/foo/*"), ""), mk_path(Some("/bar.*"), "")]);
        apply(&mut spec, false);
        assert_eq!(
            paths(&spec),
            vec![
                ("/foo".to_string(), "Prefix".to_string()),
                ("/bar".to_string(), "Prefix".to_string()),
            ]
        );

        let mut spec = mk_spec(vec![mk_path(Some("/foo/*"), "")]);
        apply(&mut spec, true);
        assert_eq!(
            paths(&spec),
            vec![("/foo/*".to_string(), "Prefix".to_string())]
        );
    }

    #[test]
    fn rules_without_http_keep_their_host() {
        let mut spec = IngressSpec {
            rules: Some(vec![IngressRule::default()]),
            ..Default::default()
        };
        apply(&mut spec, false);
        assert_eq!(spec.rules.expect("rules")[0].host, None);
    }
}
