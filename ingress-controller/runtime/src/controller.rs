use crate::{
    handlers::HandlerRegistry,
    metrics::{ControllerMetrics, Outcome},
    queue::WorkQueue,
};
use meshgate_ingress_core::{config::EventKind, Event};
use meshgate_ingress_k8s_api::ResourceId;
use meshgate_ingress_k8s_index::{
    is_eligible, ClusterInfo, ConfigError, ConversionMetrics, IngressConfig, IngressLister,
    Snapshot, SnapshotStore,
};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info_span, Instrument};

const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Decides, for each queued ingress key, whether the configs derived from it must be
/// regenerated, and notifies the registered handlers when they must.
#[derive(Debug)]
pub struct Controller<L> {
    lister: L,
    snapshots: Arc<SnapshotStore>,
    handlers: HandlerRegistry,
    queue: Arc<WorkQueue<ResourceId>>,
    cluster: Arc<ClusterInfo>,
    conversion_metrics: ConversionMetrics,
    metrics: ControllerMetrics,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read ingress state: {0}")]
    Fetch(anyhow::Error),

    #[error("invalid ingress: {0}")]
    Invalid(#[source] ConfigError),
}

// === impl Controller ===

impl<L> Controller<L>
where
    L: IngressLister + Send + Sync + 'static,
{
    pub fn new(
        lister: L,
        snapshots: Arc<SnapshotStore>,
        handlers: HandlerRegistry,
        queue: Arc<WorkQueue<ResourceId>>,
        cluster: Arc<ClusterInfo>,
        conversion_metrics: ConversionMetrics,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            lister,
            snapshots,
            handlers,
            queue,
            cluster,
            conversion_metrics,
            metrics,
        }
    }

    /// Reconciles a single ingress key.
    ///
    /// Handlers are notified when the ingress was deleted after being processed, when it
    /// becomes eligible or ineligible, or when its annotations, labels, or spec changed since it
    /// was last processed.
    pub fn on_event(&self, id: &ResourceId) -> Result<(), Error> {
        let Some(ingress) = self.lister.ingress(id).map_err(Error::Fetch)? else {
            // The resource is gone, so only the snapshot knows whether it was ever processed.
            if self.snapshots.remove(id).is_some() {
                tracing::info!(ns = %id.namespace, name = %id.name, "Ingress deleted");
                self.notify(id, EventKind::Delete);
            }
            return Ok(());
        };

        let eligible = is_eligible(&self.lister, &ingress, &self.cluster).map_err(Error::Fetch)?;
        if !eligible {
            if self.snapshots.remove(id).is_some() {
                tracing::info!(ns = %id.namespace, name = %id.name, "Ingress is no longer eligible");
                self.notify(id, EventKind::Update);
            } else {
                tracing::trace!(ns = %id.namespace, name = %id.name, "Ignoring ineligible ingress");
            }
            return Ok(());
        }

        if let Err(error) = IngressConfig::from_ingress(&ingress) {
            self.conversion_metrics
                .record_invalid(&self.cluster.cluster_id, Event::Unknown);
            if self.snapshots.remove(id).is_some() {
                self.notify(id, EventKind::Update);
            }
            return Err(Error::Invalid(error));
        }

        let snapshot = Snapshot::of(&ingress);
        match self.snapshots.put(id.clone(), snapshot.clone()) {
            None => {
                tracing::info!(ns = %id.namespace, name = %id.name, "Ingress is eligible");
            }
            Some(previous) => match previous.changed_field(&snapshot) {
                Some(field) => {
                    tracing::info!(ns = %id.namespace, name = %id.name, %field, "Ingress changed");
                }
                None => {
                    tracing::debug!(ns = %id.namespace, name = %id.name, "Ingress unchanged");
                    return Ok(());
                }
            },
        }

        self.notify(id, EventKind::Update);
        Ok(())
    }

    /// Processes one key from the queue. Returns false once the queue has shut down.
    pub async fn process_next_work_item(&self) -> bool {
        let Some(id) = self.queue.get().await else {
            return false;
        };

        match self.on_event(&id) {
            Ok(()) => {
                self.queue.forget(&id);
                self.metrics.reconciled(Outcome::Ok);
            }
            Err(error) if error.is_retryable() => {
                let delay = self.queue.add_rate_limited(id.clone());
                tracing::warn!(ns = %id.namespace, name = %id.name, %error, ?delay, "Retrying ingress");
                self.metrics.reconciled(Outcome::Retry);
            }
            Err(error) => {
                tracing::warn!(ns = %id.namespace, name = %id.name, %error, "Dropping invalid ingress");
                self.queue.forget(&id);
                self.metrics.reconciled(Outcome::Invalid);
            }
        }
        self.metrics.set_snapshots(self.snapshots.len());
        self.queue.done(&id);
        true
    }

    /// Waits for `caches_synced` to hold, then processes keys with `workers` concurrent workers
    /// until shutdown is signaled. Keys queued before shutdown are drained.
    ///
    /// `caches_synced` must cover every cache a conversion reads, including the services that
    /// backends resolve against, not only the ingress lister.
    pub async fn run<F>(self: Arc<Self>, workers: usize, caches_synced: F, drain: drain::Watch)
    where
        F: Fn() -> bool,
    {
        let synced = async {
            while !caches_synced() {
                tokio::time::sleep(SYNC_POLL_INTERVAL).await;
            }
        };
        tokio::select! {
            _ = synced => {}
            _ = drain.clone().signaled() => {
                tracing::info!("Shutdown before caches synced");
                self.queue.shut_down();
                return;
            }
        }

        let workers = workers.max(1);
        tracing::info!(workers, "Caches synced; starting workers");
        let tasks = (0..workers)
            .map(|worker| {
                let controller = self.clone();
                tokio::spawn(
                    async move { while controller.process_next_work_item().await {} }
                        .instrument(info_span!("worker", worker)),
                )
            })
            .collect::<Vec<_>>();

        let release = drain.signaled().await;
        self.queue.shut_down();
        release
            .release_after(async move {
                for res in futures::future::join_all(tasks).await {
                    if let Err(error) = res {
                        tracing::error!(%error, "Worker failed");
                    }
                }
            })
            .await;
        tracing::debug!("Workers stopped");
    }

    fn notify(&self, id: &ResourceId, event: EventKind) {
        self.handlers.notify(id, event);
        self.metrics.notified();
    }
}

// === impl Error ===

impl Error {
    /// Fetch failures may succeed later. Invalid input never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}
