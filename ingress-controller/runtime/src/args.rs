use crate::{
    controller::Controller,
    distribution::{Debounce, Distribution, PushCounters, Pusher},
    enqueue::{Enqueue, RequestPush},
    handlers::HandlerRegistry,
    index::{
        ClusterInfo, ConversionContext, ConversionMetrics, Converter, IngressLister, IngressStore,
        ServiceIndex, SnapshotStore,
    },
    k8s::{Client, Ingress, IngressClass, Resource, Service},
    metrics::{ControllerMetrics, WatchMetrics},
    queue::{Backoff, WorkQueue},
    readiness::Readiness,
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use meshgate_ingress_core::DEFAULT_INGRESS_CLASS;
use prometheus_client::registry::Registry;
use std::{collections::BTreeMap, sync::Arc};
use tokio::{sync::watch, time::Duration};
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "meshgate-ingress",
    about = "Converts ingresses into mesh gateway and routing configuration"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "meshgate=info,warn",
        env = "MESHGATE_INGRESS_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Identifies the cluster in generated names and credential references.
    #[clap(long, default_value = "")]
    cluster_id: String,

    /// The ingress class claimed by the controller. When empty, every ingress is claimed.
    #[clap(long, default_value = DEFAULT_INGRESS_CLASS)]
    ingress_class: String,

    /// Restricts the controller to ingresses in a single namespace.
    #[clap(long)]
    watch_namespace: Option<String>,

    #[clap(long, requires = "gateway_selector_value")]
    gateway_selector_key: Option<String>,

    #[clap(long, requires = "gateway_selector_key")]
    gateway_selector_value: Option<String>,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    #[clap(long, default_value = "100")]
    push_debounce_ms: u64,

    #[clap(long, default_value = "1")]
    workers: usize,

    #[clap(long, default_value = "5")]
    queue_base_delay_ms: u64,

    #[clap(long, default_value = "1000")]
    queue_max_delay_secs: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            cluster_id,
            ingress_class,
            watch_namespace,
            gateway_selector_key,
            gateway_selector_value,
            cluster_domain,
            push_debounce_ms,
            workers,
            queue_base_delay_ms,
            queue_max_delay_secs,
        } = self;

        let gateway_selector = gateway_selector_key
            .zip(gateway_selector_value)
            .into_iter()
            .collect::<BTreeMap<_, _>>();
        let cluster = Arc::new(ClusterInfo {
            cluster_id,
            ingress_class,
            watch_namespace: watch_namespace.filter(|ns| !ns.is_empty()),
            gateway_selector,
            cluster_domain,
        });

        let mut prom = <Registry>::default();
        let ingress_prom = prom.sub_registry_with_prefix("ingress");
        let conversion_metrics = ConversionMetrics::register(ingress_prom);
        let controller_metrics =
            ControllerMetrics::register(ingress_prom.sub_registry_with_prefix("controller"));
        let watch_metrics = WatchMetrics::register(ingress_prom);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        ensure_api_resources(&runtime.client()).await?;

        let queue = WorkQueue::shared(Backoff::new(
            Duration::from_millis(queue_base_delay_ms),
            Duration::from_secs(queue_max_delay_secs),
        ));
        let store = IngressStore::shared();
        let services = ServiceIndex::shared();

        // Spawn resource watches.

        let enqueue = Enqueue::new(store.clone(), queue.clone(), watch_metrics.clone()).shared();
        let ingresses = runtime.watch_all::<Ingress>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(enqueue.clone(), ingresses)
                .instrument(info_span!("ingresses")),
        );

        let classes = runtime.watch_all::<IngressClass>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(enqueue, classes).instrument(info_span!("ingressclasses")),
        );

        // Every handler feeds the distribution layer, which regenerates the full configuration
        // for each debounced batch of notifications. Service changes request a push directly.
        let counters = Arc::new(PushCounters::default());
        let (distribution, push_rx) = Distribution::new(counters.clone());

        let svcs = runtime.watch_all::<Service>(watcher::Config::default());
        let request_push =
            RequestPush::new(services.clone(), distribution.clone(), watch_metrics.clone()).shared();
        tokio::spawn(
            kubert::index::namespaced(request_push, svcs).instrument(info_span!("services")),
        );

        let handlers = HandlerRegistry::builder()
            .register_all(distribution.handler())
            .build();

        let converter = Converter::new(cluster.clone(), services.clone(), conversion_metrics.clone());
        let (pusher, contexts) = Pusher::new(
            store.clone(),
            converter,
            conversion_metrics.clone(),
            counters.clone(),
            push_rx,
            Debounce::new(Duration::from_millis(push_debounce_ms)),
        );
        tokio::spawn(
            pusher
                .run(runtime.shutdown_handle())
                .instrument(info_span!("pusher")),
        );
        tokio::spawn(log_contexts(contexts).instrument(info_span!("contexts")));

        // Conversion reads both the ingress store and the service index, so neither the workers
        // nor readiness may proceed until both have synced.
        let caches_synced = {
            let store = store.clone();
            move || store.has_synced() && services.read().has_synced()
        };

        let controller = Arc::new(Controller::new(
            store.clone(),
            Arc::new(SnapshotStore::default()),
            handlers,
            queue,
            cluster,
            conversion_metrics,
            controller_metrics,
        ));
        tokio::spawn(
            controller
                .run(workers, caches_synced.clone(), runtime.shutdown_handle())
                .instrument(info_span!("controller")),
        );

        let initialized = runtime.initialized_handle();
        let drain = runtime.shutdown_handle();
        tokio::spawn(
            async move {
                Readiness::default()
                    .release_when_ready(caches_synced, &counters, initialized, drain)
                    .await
            }
            .instrument(info_span!("readiness")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background
        // tasks to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Fails if any watched kind is not served by the API server, naming all missing kinds.
async fn ensure_api_resources(client: &Client) -> Result<()> {
    let mut missing = Vec::new();
    if !api_resource_exists::<Ingress>(client).await {
        missing.push("ingresses.networking.k8s.io");
    }
    if !api_resource_exists::<IngressClass>(client).await {
        missing.push("ingressclasses.networking.k8s.io");
    }
    if !api_resource_exists::<Service>(client).await {
        missing.push("services");
    }
    if !missing.is_empty() {
        bail!("resource kinds not found: {}", missing.join(", "));
    }
    Ok(())
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    let api_version = T::api_version(&dt);
    let resources = if T::group(&dt).is_empty() {
        client.list_core_api_resources(&api_version).await
    } else {
        client.list_api_group_resources(&api_version).await
    };
    resources
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}

async fn log_contexts(mut contexts: watch::Receiver<Arc<ConversionContext>>) {
    while contexts.changed().await.is_ok() {
        let ctx = contexts.borrow_and_update().clone();
        tracing::debug!(
            gateways = ctx.gateways.len(),
            hosts = ctx.http_routes.len(),
            traffic_policies = ctx.traffic_policies.len(),
            invalid_routes = ctx.routes.invalid().len(),
            invalid_domains = ctx.domains.invalid.len(),
            "Configuration updated"
        );
    }
}
