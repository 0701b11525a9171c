use meshgate_ingress_core::config::{ConfigKind, ConfigMeta, EventKind};
use meshgate_ingress_k8s_index::{
    list_configs, ConversionContext, ConversionMetrics, Converter, IngressLister, ServiceLookup,
};
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use tokio::{
    sync::{mpsc, watch},
    time::{self, Duration, Instant},
};

/// Counts the change notifications received by the distribution layer and the ones whose
/// configuration has been regenerated and published.
#[derive(Debug, Default)]
pub struct PushCounters {
    inbound: AtomicI64,
    committed: AtomicI64,
}

/// A change notification awaiting a push.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushRequest {
    pub kind: ConfigKind,
    pub namespace: String,
    pub name: String,
    pub event: EventKind,
}

/// Accepts change notifications from the controller's handlers.
#[derive(Clone, Debug)]
pub struct Distribution {
    counters: Arc<PushCounters>,
    tx: mpsc::UnboundedSender<PushRequest>,
}

/// Bounds how long push requests are batched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Debounce {
    /// A batch is pushed once no request has arrived for this long.
    pub quiet: Duration,
    /// A batch is pushed at most this long after its first request.
    pub max: Duration,
}

/// Regenerates the converted configuration for batches of push requests.
#[derive(Debug)]
pub struct Pusher<L, S> {
    lister: L,
    converter: Converter<S>,
    metrics: ConversionMetrics,
    counters: Arc<PushCounters>,
    rx: mpsc::UnboundedReceiver<PushRequest>,
    tx: watch::Sender<Arc<ConversionContext>>,
    debounce: Debounce,
}

// === impl PushCounters ===

impl PushCounters {
    pub fn inbound(&self) -> i64 {
        self.inbound.load(Ordering::Acquire)
    }

    pub fn committed(&self) -> i64 {
        self.committed.load(Ordering::Acquire)
    }

    pub fn record_inbound(&self) {
        self.inbound.fetch_add(1, Ordering::AcqRel);
    }

    pub fn commit(&self, n: i64) {
        self.committed.fetch_add(n, Ordering::AcqRel);
    }
}

// === impl Distribution ===

impl Distribution {
    pub fn new(counters: Arc<PushCounters>) -> (Self, mpsc::UnboundedReceiver<PushRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { counters, tx }, rx)
    }

    /// Returns a handler that records a notification and requests a push.
    pub fn handler(&self) -> impl Fn(&ConfigMeta, &ConfigMeta, EventKind) + Send + Sync + 'static {
        let distribution = self.clone();
        move |_: &ConfigMeta, meta: &ConfigMeta, event: EventKind| {
            distribution.request(PushRequest {
                kind: meta.kind,
                namespace: meta.namespace.clone(),
                name: meta.name.clone(),
                event,
            });
        }
    }

    /// Records a notification and requests a push.
    pub fn request(&self, req: PushRequest) {
        self.counters.record_inbound();
        if let Err(mpsc::error::SendError(req)) = self.tx.send(req) {
            tracing::debug!(kind = req.kind.as_str(), name = %req.name, "Pusher has stopped");
        }
    }
}

// === impl Debounce ===

impl Debounce {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            max: quiet * 10,
        }
    }
}

// === impl Pusher ===

impl<L, S> Pusher<L, S>
where
    L: IngressLister,
    S: ServiceLookup,
{
    pub fn new(
        lister: L,
        converter: Converter<S>,
        metrics: ConversionMetrics,
        counters: Arc<PushCounters>,
        rx: mpsc::UnboundedReceiver<PushRequest>,
        debounce: Debounce,
    ) -> (Self, watch::Receiver<Arc<ConversionContext>>) {
        let (tx, watch_rx) = watch::channel(Arc::new(ConversionContext::default()));
        let pusher = Self {
            lister,
            converter,
            metrics,
            counters,
            rx,
            tx,
            debounce,
        };
        (pusher, watch_rx)
    }

    /// Runs a conversion pass for each debounced batch of requests until shutdown.
    pub async fn run(mut self, drain: drain::Watch) {
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);

        loop {
            let batch = tokio::select! {
                batch = self.next_batch() => batch,
                _ = &mut shutdown => {
                    tracing::debug!("Shutdown");
                    return;
                }
            };
            match batch {
                Some(n) => self.push(n),
                None => {
                    tracing::debug!("Handlers dropped");
                    return;
                }
            }
        }
    }

    /// Waits for a request, then absorbs further requests until the debounce window closes.
    ///
    /// Returns the number of requests absorbed, or `None` once every sender is gone.
    async fn next_batch(&mut self) -> Option<i64> {
        let first = self.rx.recv().await?;
        tracing::trace!(?first, "Push requested");
        let start = Instant::now();
        let mut absorbed = 1;

        loop {
            let deadline = (Instant::now() + self.debounce.quiet).min(start + self.debounce.max);
            match time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(_)) => absorbed += 1,
                Ok(None) | Err(_) => return Some(absorbed),
            }
        }
    }

    /// Regenerates the converted configuration from every eligible ingress and publishes it,
    /// committing `absorbed` requests.
    pub fn push(&self, absorbed: i64) {
        let configs = list_configs(&self.lister, self.converter.cluster(), &self.metrics);
        let ctx = self.converter.convert(&configs);
        tracing::info!(
            ingresses = configs.len(),
            hosts = ctx.http_routes.len(),
            requests = absorbed,
            "Pushed configuration"
        );
        self.tx.send_replace(Arc::new(ctx));
        self.counters.commit(absorbed);
    }
}
