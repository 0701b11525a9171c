use super::*;
use meshgate_ingress_core::http_route::PathType;

fn mk_default_backend_ingress(ns: &str, name: &str, service: &str) -> Ingress {
    mk_ingress(
        ns,
        name,
        IngressSpec {
            default_backend: Some(mk_backend(service, 80)),
            ..Default::default()
        },
    )
}

#[test]
fn installs_wildcard_catch_all() {
    let fixture = Fixture::new([]);
    let ctx = fixture.convert([mk_default_backend_ingress("ns-0", "ingress-0", "web")]);

    assert!(ctx.has_default_backend);
    let routes = ctx.routes_for("*");
    assert_eq!(routes.len(), 1);
    let route = &routes[0];
    assert!(route.is_default_backend);
    assert_eq!(route.origin_path_type, PathType::Prefix);
    assert_eq!(route.origin_path, "/");
    assert!(route.route.matches.is_empty());
    assert!(route.route.name.ends_with("-default"));
    assert_eq!(destinations(route), vec![("web".to_string(), 80, 100)]);
    assert_eq!(ctx.routes.valid("*").len(), 1);
}

#[test]
fn later_default_backend_replaces_wildcard_catch_all() {
    let fixture = Fixture::new([]);
    let ctx = fixture.convert([
        mk_default_backend_ingress("ns-0", "ingress-0", "web"),
        mk_default_backend_ingress("ns-0", "ingress-1", "api"),
    ]);

    let routes = ctx.routes_for("*");
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].source, ResourceId::new("ns-0", "ingress-1"));
    assert_eq!(destinations(&routes[0]), vec![("api".to_string(), 80, 100)]);

    let entries = ctx.routes.valid("*");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].services[0].name, "api");
}

#[test]
fn explicit_catch_all_wins_over_default_backend() {
    let fixture = Fixture::new([]);
    let explicit = mk_ingress(
        "ns-0",
        "ingress-0",
        mk_rules_spec(vec![mk_rule(
            None,
            vec![mk_path("/", "Prefix", mk_backend("web", 80))],
        )]),
    );
    let ctx = fixture.convert([
        explicit,
        mk_default_backend_ingress("ns-0", "ingress-1", "api"),
    ]);

    let routes = ctx.routes_for("*");
    assert_eq!(routes.len(), 1);
    assert!(!routes[0].is_default_backend);
    assert_eq!(destinations(&routes[0]), vec![("web".to_string(), 80, 100)]);
}

#[test]
fn appends_catch_all_to_rule_hosts() {
    let fixture = Fixture::new([]);
    let ingress = mk_ingress(
        "ns-0",
        "ingress-0",
        IngressSpec {
            default_backend: Some(mk_backend("fallback", 80)),
            rules: Some(vec![
                mk_rule(
                    Some("foo.example.com"),
                    vec![mk_path("/api", "Prefix", mk_backend("api", 80))],
                ),
                mk_rule(
                    Some("bar.example.com"),
                    vec![mk_path("/", "Prefix", mk_backend("web", 80))],
                ),
            ]),
            ..Default::default()
        },
    );
    let ctx = fixture.convert([ingress]);

    let foo = ctx.routes_for("foo.example.com");
    assert_eq!(foo.len(), 2);
    assert_eq!(foo[0].origin_path, "/api");
    assert!(foo[1].is_default_backend);
    assert_eq!(destinations(&foo[1]), vec![("fallback".to_string(), 80, 100)]);
    assert!(ctx.virtual_services["foo.example.com"].configured_default_backend);

    let bar = ctx.routes_for("bar.example.com");
    assert_eq!(bar.len(), 1);
    assert!(!bar[0].is_default_backend);

    assert_eq!(ctx.routes_for("*").len(), 1);
}

#[test]
fn unresolvable_default_backend_is_skipped() {
    let fixture = Fixture::new([]);
    let ingress = mk_ingress(
        "ns-0",
        "ingress-0",
        IngressSpec {
            default_backend: Some(mk_named_backend("web", "http")),
            ..Default::default()
        },
    );
    let ctx = fixture.convert([ingress]);

    assert!(ctx.routes_for("*").is_empty());
    assert_eq!(ctx.routes.invalid().len(), 1);
    assert_eq!(fixture.invalid(Event::PortNameResolveError), 1);
}

#[test]
fn canaries_do_not_install_default_backends() {
    let fixture = Fixture::new([]);
    let canary = with_annotations(
        mk_default_backend_ingress("ns-0", "ingress-0", "web"),
        &[("meshgate.io/canary", "true")],
    );
    let ctx = fixture.convert([canary]);

    assert!(ctx.routes_for("*").is_empty());
    assert!(!ctx.has_default_backend);
}

#[test]
fn default_backend_pass_requires_a_service_backend() {
    let fixture = Fixture::new([]);
    let ingress = mk_ingress(
        "ns-0",
        "ingress-0",
        IngressSpec {
            default_backend: Some(IngressBackend::default()),
            ..Default::default()
        },
    );
    let ctx = fixture.convert([ingress]);

    assert!(!ctx.has_default_backend);
    assert!(ctx.routes_for("*").is_empty());
    assert!(ctx.routes.invalid().is_empty());
    assert_eq!(fixture.invalid(Event::InvalidBackendService), 0);
}
