mod default_backend;

use super::*;
use kubert::index::{IndexClusterResource, IndexNamespacedResource};
use maplit::btreemap;
use meshgate_ingress_core::Event;
use meshgate_ingress_k8s_api::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressClass, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ObjectMeta, ResourceId, Service,
    ServiceBackendPort, ServicePort, ServiceSpec, INGRESS_CLASS_ANNOTATION,
};
use std::sync::Arc;

const CLUSTER_ID: &str = "cluster-0";

struct Fixture {
    converter: Converter<SharedServices>,
    metrics: ConversionMetrics,
}

impl Fixture {
    fn new(services: impl IntoIterator<Item = Service>) -> Self {
        let index = ServiceIndex::shared();
        for svc in services {
            index.write().apply(svc);
        }
        let metrics = ConversionMetrics::register(&mut Default::default());
        let converter = Converter::new(Arc::new(mk_cluster()), index, metrics.clone());
        Self { converter, metrics }
    }

    fn convert(&self, ingresses: impl IntoIterator<Item = Ingress>) -> ConversionContext {
        let configs = ingresses
            .into_iter()
            .map(|i| Arc::new(IngressConfig::from_ingress(&i).expect("ingress must be valid")))
            .collect::<Vec<_>>();
        self.converter.convert(&configs)
    }

    fn invalid(&self, event: Event) -> u64 {
        self.metrics.invalid_count(CLUSTER_ID, event)
    }
}

fn mk_cluster() -> ClusterInfo {
    ClusterInfo {
        cluster_id: CLUSTER_ID.to_string(),
        gateway_selector: btreemap! {
            "app".to_string() => "meshgate-gateway".to_string(),
        },
        ..Default::default()
    }
}

fn mk_ingress(ns: &str, name: &str, spec: IngressSpec) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    }
}

fn with_annotations(mut ingress: Ingress, annotations: &[(&str, &str)]) -> Ingress {
    let anns = ingress.metadata.annotations.get_or_insert_with(Default::default);
    for (k, v) in annotations {
        anns.insert(k.to_string(), v.to_string());
    }
    ingress
}

fn mk_rules_spec(rules: Vec<IngressRule>) -> IngressSpec {
    IngressSpec {
        rules: Some(rules),
        ..Default::default()
    }
}

fn mk_rule(host: Option<&str>, paths: Vec<HTTPIngressPath>) -> IngressRule {
    IngressRule {
        host: host.map(ToString::to_string),
        http: Some(HTTPIngressRuleValue { paths }),
    }
}

fn mk_path(path: &str, path_type: &str, backend: IngressBackend) -> HTTPIngressPath {
    HTTPIngressPath {
        path: Some(path.to_string()),
        path_type: path_type.to_string(),
        backend,
    }
}

fn mk_backend(service: &str, port: i32) -> IngressBackend {
    IngressBackend {
        service: Some(IngressServiceBackend {
            name: service.to_string(),
            port: Some(ServiceBackendPort {
                number: Some(port),
                name: None,
            }),
        }),
        ..Default::default()
    }
}

fn mk_named_backend(service: &str, port: &str) -> IngressBackend {
    IngressBackend {
        service: Some(IngressServiceBackend {
            name: service.to_string(),
            port: Some(ServiceBackendPort {
                number: None,
                name: Some(port.to_string()),
            }),
        }),
        ..Default::default()
    }
}

fn mk_tls(hosts: &[&str], secret: &str) -> IngressTLS {
    IngressTLS {
        hosts: Some(hosts.iter().map(ToString::to_string).collect()),
        secret_name: Some(secret.to_string()),
    }
}

fn mk_service(ns: &str, name: &str, ports: &[(&str, i32)]) -> Service {
    Service {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(
                ports
                    .iter()
                    .map(|(name, port)| ServicePort {
                        name: Some(name.to_string()).filter(|n| !n.is_empty()),
                        port: *port,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn destinations(route: &convert::WrapperHttpRoute) -> Vec<(String, u32, u32)> {
    route
        .route
        .route
        .iter()
        .map(|d| (d.destination.service.clone(), d.destination.port, d.weight))
        .collect()
}

#[test]
fn lists_eligible_configs_oldest_first() {
    let store = IngressStore::shared();
    let spec = || {
        mk_rules_spec(vec![mk_rule(
            None,
            vec![mk_path("/", "Prefix", mk_backend("web", 80))],
        )])
    };
    IndexNamespacedResource::<Ingress>::reset(
        &mut *store.write(),
        vec![
            mk_ingress("ns-1", "ingress-0", spec()),
            mk_ingress("ns-0", "ingress-1", spec()),
            mk_ingress("ns-0", "ingress-0", spec()),
            with_annotations(
                mk_ingress("ns-0", "other-class", spec()),
                &[(INGRESS_CLASS_ANNOTATION, "nginx")],
            ),
            with_annotations(
                mk_ingress("ns-0", "invalid", spec()),
                &[("meshgate.io/canary", "maybe")],
            ),
        ],
        Default::default(),
    );

    let metrics = ConversionMetrics::register(&mut Default::default());
    let configs = list_configs(&store, &mk_cluster(), &metrics);
    let ids = configs.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            ResourceId::new("ns-0", "ingress-0"),
            ResourceId::new("ns-0", "ingress-1"),
            ResourceId::new("ns-1", "ingress-0"),
        ]
    );
    assert_eq!(metrics.invalid_count(CLUSTER_ID, Event::Unknown), 1);
    assert_eq!(metrics.ingress_count(CLUSTER_ID), 3);
}

#[test]
fn store_tracks_sync_and_deletes() {
    let store = IngressStore::shared();
    assert!(!store.has_synced());

    IndexNamespacedResource::<Ingress>::reset(
        &mut *store.write(),
        vec![mk_ingress("ns-0", "ingress-0", IngressSpec::default())],
        Default::default(),
    );
    assert!(!store.has_synced(), "ingress classes must also sync");

    IndexClusterResource::<IngressClass>::reset(&mut *store.write(), vec![], Default::default());
    assert!(store.has_synced());

    let id = ResourceId::new("ns-0", "ingress-0");
    assert!(store.ingress(&id).expect("lookup").is_some());
    IndexNamespacedResource::<Ingress>::delete(
        &mut *store.write(),
        "ns-0".to_string(),
        "ingress-0".to_string(),
    );
    assert!(store.ingress(&id).expect("lookup").is_none());
}

#[test]
fn eligibility_resolves_ingress_classes() {
    let store = IngressStore::shared();
    IndexClusterResource::<IngressClass>::apply(
        &mut *store.write(),
        IngressClass {
            metadata: ObjectMeta {
                name: Some("edge".to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
    );

    let cluster = ClusterInfo {
        ingress_class: "edge".to_string(),
        ..mk_cluster()
    };
    let ingress = mk_ingress(
        "ns-0",
        "ingress-0",
        IngressSpec {
            ingress_class_name: Some("edge".to_string()),
            ..Default::default()
        },
    );
    assert!(is_eligible(&store, &ingress, &cluster).expect("eligibility"));

    let cluster = ClusterInfo {
        watch_namespace: Some("ns-1".to_string()),
        ..cluster
    };
    assert!(!is_eligible(&store, &ingress, &cluster).expect("eligibility"));
}

#[test]
fn resolves_named_ports() {
    let services = ServiceIndex::shared();
    services
        .write()
        .apply(mk_service("ns-0", "web", &[("", 8000), ("http", 8080)]));

    assert_eq!(services.resolve_named_port("ns-0", "web", "http"), Ok(8080));
    assert_eq!(services.resolve_named_port("ns-0", "web", ""), Ok(8000));
    assert!(matches!(
        services.resolve_named_port("ns-0", "web", "grpc"),
        Err(PortError::PortNotFound { .. })
    ));
    assert!(matches!(
        services.resolve_named_port("ns-1", "web", "http"),
        Err(PortError::ServiceNotFound { .. })
    ));

    services
        .write()
        .delete("ns-0".to_string(), "web".to_string());
    assert!(matches!(
        services.resolve_named_port("ns-0", "web", "http"),
        Err(PortError::ServiceNotFound { .. })
    ));
}

#[test]
fn conversion_is_independent_of_input_order() {
    let fixture = Fixture::new([mk_service("ns-0", "web", &[("http", 80)])]);
    let a = mk_ingress(
        "ns-0",
        "ingress-0",
        mk_rules_spec(vec![mk_rule(
            Some("foo.example.com"),
            vec![mk_path("/", "Prefix", mk_backend("web", 80))],
        )]),
    );
    let b = mk_ingress(
        "ns-0",
        "ingress-1",
        mk_rules_spec(vec![mk_rule(
            Some("foo.example.com"),
            vec![mk_path("/", "Prefix", mk_backend("api", 80))],
        )]),
    );

    let forward = fixture.convert([a.clone(), b.clone()]);
    let reverse = fixture.convert([b, a]);
    assert_eq!(
        forward.routes_for("foo.example.com"),
        reverse.routes_for("foo.example.com")
    );
    assert_eq!(
        forward.routes_for("foo.example.com")[0].source,
        ResourceId::new("ns-0", "ingress-0")
    );
}
