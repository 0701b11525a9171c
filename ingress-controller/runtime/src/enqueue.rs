use crate::{
    distribution::{Distribution, PushRequest},
    metrics::WatchMetrics,
    queue::WorkQueue,
};
use kubert::index::{
    ClusterRemoved, IndexClusterResource, IndexNamespacedResource, NamespacedRemoved,
};
use meshgate_ingress_core::config::{ConfigKind, EventKind};
use meshgate_ingress_k8s_api::{Ingress, IngressClass, ResourceExt, ResourceId, Service};
use meshgate_ingress_k8s_index::IngressLister;
use parking_lot::RwLock;
use std::sync::Arc;

/// Updates a resource store from watch events and queues the ingresses each event affects.
#[derive(Debug)]
pub struct Enqueue<T> {
    inner: Arc<RwLock<T>>,
    queue: Arc<WorkQueue<ResourceId>>,
    metrics: WatchMetrics,
}

/// Updates the service index from watch events and requests a push for each changed service.
///
/// Services do not map to ingress keys, but backends resolve their ports against them, so a
/// service change must regenerate the converted configuration directly.
#[derive(Debug)]
pub struct RequestPush<T> {
    inner: Arc<RwLock<T>>,
    distribution: Distribution,
    metrics: WatchMetrics,
}

// === impl Enqueue ===

impl<T> Enqueue<T> {
    pub fn new(
        inner: Arc<RwLock<T>>,
        queue: Arc<WorkQueue<ResourceId>>,
        metrics: WatchMetrics,
    ) -> Self {
        Self {
            inner,
            queue,
            metrics,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }
}

impl<T> IndexNamespacedResource<Ingress> for Enqueue<T>
where
    T: IndexNamespacedResource<Ingress>,
{
    fn apply(&mut self, ingress: Ingress) {
        let id = ResourceId::of(&ingress);
        self.metrics.applied("Ingress");
        self.inner.write().apply(ingress);
        if let Some(id) = id {
            self.queue.add(id);
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.metrics.deleted("Ingress");
        self.inner.write().delete(namespace.clone(), name.clone());
        self.queue.add(ResourceId::new(namespace, name));
    }

    fn reset(&mut self, ingresses: Vec<Ingress>, removed: NamespacedRemoved) {
        let ids = ingresses
            .iter()
            .filter_map(ResourceId::of)
            .chain(removed.iter().flat_map(|(namespace, names)| {
                names
                    .iter()
                    .map(move |name| ResourceId::new(namespace.clone(), name.clone()))
            }))
            .collect::<Vec<_>>();
        self.metrics.reset("Ingress");
        self.inner.write().reset(ingresses, removed);
        for id in ids {
            self.queue.add(id);
        }
    }
}

impl<T> IndexClusterResource<IngressClass> for Enqueue<T>
where
    T: IndexClusterResource<IngressClass> + IngressLister,
{
    fn apply(&mut self, class: IngressClass) {
        let name = class.name_unchecked();
        self.metrics.applied("IngressClass");
        self.inner.write().apply(class);
        self.enqueue_class_members(&[name]);
    }

    fn delete(&mut self, name: String) {
        self.metrics.deleted("IngressClass");
        self.inner.write().delete(name.clone());
        self.enqueue_class_members(&[name]);
    }

    fn reset(&mut self, classes: Vec<IngressClass>, removed: ClusterRemoved) {
        let names = classes
            .iter()
            .map(|c| c.name_unchecked())
            .chain(removed.iter().cloned())
            .collect::<Vec<_>>();
        self.metrics.reset("IngressClass");
        self.inner.write().reset(classes, removed);
        self.enqueue_class_members(&names);
    }
}

impl<T: IngressLister> Enqueue<T> {
    /// Queues every cached ingress that references one of the named classes, since the class
    /// decides the ingress's eligibility.
    fn enqueue_class_members(&self, names: &[String]) {
        let ingresses = self.inner.read().ingresses();
        for ingress in ingresses {
            let class_name = ingress
                .spec
                .as_ref()
                .and_then(|s| s.ingress_class_name.as_ref());
            if class_name.map_or(false, |n| names.contains(n)) {
                if let Some(id) = ResourceId::of(&ingress) {
                    self.queue.add(id);
                }
            }
        }
    }
}

// === impl RequestPush ===

impl<T> RequestPush<T> {
    pub fn new(inner: Arc<RwLock<T>>, distribution: Distribution, metrics: WatchMetrics) -> Self {
        Self {
            inner,
            distribution,
            metrics,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }

    fn request(&self, id: ResourceId, event: EventKind) {
        self.distribution.request(PushRequest {
            kind: ConfigKind::VirtualService,
            namespace: id.namespace,
            name: id.name,
            event,
        });
    }
}

impl<T> IndexNamespacedResource<Service> for RequestPush<T>
where
    T: IndexNamespacedResource<Service>,
{
    fn apply(&mut self, service: Service) {
        let id = ResourceId::of(&service);
        self.metrics.applied("Service");
        self.inner.write().apply(service);
        if let Some(id) = id {
            self.request(id, EventKind::Update);
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.metrics.deleted("Service");
        self.inner.write().delete(namespace.clone(), name.clone());
        self.request(ResourceId::new(namespace, name), EventKind::Delete);
    }

    fn reset(&mut self, services: Vec<Service>, removed: NamespacedRemoved) {
        let updated = services.iter().filter_map(ResourceId::of).collect::<Vec<_>>();
        let deleted = removed
            .iter()
            .flat_map(|(namespace, names)| {
                names
                    .iter()
                    .map(move |name| ResourceId::new(namespace.clone(), name.clone()))
            })
            .collect::<Vec<_>>();
        self.metrics.reset("Service");
        self.inner.write().reset(services, removed);
        for id in updated {
            self.request(id, EventKind::Update);
        }
        for id in deleted {
            self.request(id, EventKind::Delete);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{distribution::PushCounters, queue::Backoff};
    use meshgate_ingress_k8s_api::{IngressSpec, ObjectMeta, ServicePort, ServiceSpec};
    use meshgate_ingress_k8s_index::{IngressStore, PortError, ServiceIndex, ServiceLookup};

    fn mk_ingress(ns: &str, name: &str, class: Option<&str>) -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                namespace: Some(ns.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                ingress_class_name: class.map(Into::into),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn mk_class(name: &str) -> IngressClass {
        IngressClass {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn take_all(queue: &WorkQueue<ResourceId>) -> Vec<ResourceId> {
        let mut ids = Vec::new();
        while !queue.is_empty() {
            if let Some(id) = queue.get().await {
                queue.done(&id);
                ids.push(id);
            }
        }
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn queues_changed_ingresses() {
        let store = IngressStore::shared();
        let queue = WorkQueue::shared(Backoff::default());
        let metrics = WatchMetrics::default();
        let mut index = Enqueue::new(store.clone(), queue.clone(), metrics.clone());

        IndexNamespacedResource::apply(&mut index, mk_ingress("ns-0", "web", None));
        IndexNamespacedResource::<Ingress>::delete(&mut index, "ns-0".into(), "api".into());
        assert_eq!(
            take_all(&queue).await,
            vec![ResourceId::new("ns-0", "api"), ResourceId::new("ns-0", "web")]
        );
        assert!(store
            .ingress(&ResourceId::new("ns-0", "web"))
            .expect("store must not fail")
            .is_some());

        let mut removed = NamespacedRemoved::default();
        removed
            .entry("ns-0".to_string())
            .or_default()
            .insert("web".to_string());
        IndexNamespacedResource::reset(&mut index, vec![mk_ingress("ns-1", "web", None)], removed);
        assert_eq!(
            take_all(&queue).await,
            vec![ResourceId::new("ns-0", "web"), ResourceId::new("ns-1", "web")]
        );
        assert!(store
            .ingress(&ResourceId::new("ns-0", "web"))
            .expect("store must not fail")
            .is_none());

        assert_eq!(metrics.apply_count("Ingress"), 1);
        assert_eq!(metrics.delete_count("Ingress"), 1);
        assert_eq!(metrics.reset_count("Ingress"), 1);
    }

    #[tokio::test]
    async fn class_changes_queue_member_ingresses() {
        let store = IngressStore::shared();
        let queue = WorkQueue::shared(Backoff::default());
        let mut index = Enqueue::new(store.clone(), queue.clone(), WatchMetrics::default());

        IndexNamespacedResource::apply(&mut index, mk_ingress("ns-0", "a", Some("meshgate")));
        IndexNamespacedResource::apply(&mut index, mk_ingress("ns-0", "b", Some("other")));
        IndexNamespacedResource::apply(&mut index, mk_ingress("ns-0", "c", None));
        take_all(&queue).await;

        IndexClusterResource::apply(&mut index, mk_class("meshgate"));
        assert_eq!(take_all(&queue).await, vec![ResourceId::new("ns-0", "a")]);
        assert!(store
            .ingress_class("meshgate")
            .expect("store must not fail")
            .is_some());

        IndexClusterResource::<IngressClass>::delete(&mut index, "other".into());
        assert_eq!(take_all(&queue).await, vec![ResourceId::new("ns-0", "b")]);
    }

    fn mk_service(ns: &str, name: &str, port: (&str, i32)) -> Service {
        Service {
            metadata: ObjectMeta {
                namespace: Some(ns.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some(port.0.to_string()),
                    port: port.1,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn service_changes_request_pushes() {
        let services = ServiceIndex::shared();
        let counters = Arc::new(PushCounters::default());
        let (distribution, mut rx) = Distribution::new(counters.clone());
        let metrics = WatchMetrics::default();
        let mut index = RequestPush::new(services.clone(), distribution, metrics.clone());

        assert!(!services.read().has_synced());
        IndexNamespacedResource::reset(
            &mut index,
            vec![mk_service("ns-0", "web", ("http", 8080))],
            NamespacedRemoved::default(),
        );
        assert!(services.read().has_synced());
        assert_eq!(services.resolve_named_port("ns-0", "web", "http"), Ok(8080));

        IndexNamespacedResource::apply(&mut index, mk_service("ns-0", "web", ("http", 9090)));
        assert_eq!(services.resolve_named_port("ns-0", "web", "http"), Ok(9090));

        IndexNamespacedResource::<Service>::delete(&mut index, "ns-0".into(), "web".into());
        assert!(matches!(
            services.resolve_named_port("ns-0", "web", "http"),
            Err(PortError::ServiceNotFound { .. })
        ));

        let mut requests = Vec::new();
        while let Ok(req) = rx.try_recv() {
            assert_eq!(req.kind, ConfigKind::VirtualService);
            requests.push((req.namespace, req.name, req.event));
        }
        let web = |event| ("ns-0".to_string(), "web".to_string(), event);
        assert_eq!(
            requests,
            vec![
                web(EventKind::Update),
                web(EventKind::Update),
                web(EventKind::Delete)
            ]
        );
        assert_eq!(counters.inbound(), 3);
        assert_eq!(metrics.reset_count("Service"), 1);
        assert_eq!(metrics.apply_count("Service"), 1);
        assert_eq!(metrics.delete_count("Service"), 1);
    }
}
