use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    reconciles: Family<ResultLabels, Counter>,
    notifications: Counter,
    snapshots: Gauge,
}

#[derive(Clone, Debug)]
pub struct WatchMetrics {
    applies: Family<KindLabels, Counter>,
    deletes: Family<KindLabels, Counter>,
    resets: Family<KindLabels, Counter>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Retry,
    Invalid,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResultLabels {
    result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let reconciles = Family::default();
        prom.register(
            "reconcile",
            "Count of processed work queue keys, by result",
            reconciles.clone(),
        );

        let notifications = Counter::default();
        prom.register(
            "notifications",
            "Count of reconciliations that notified change handlers",
            notifications.clone(),
        );

        let snapshots = Gauge::default();
        prom.register(
            "snapshots",
            "Gauge of the number of ingresses with a processed snapshot",
            snapshots.clone(),
        );

        Self {
            reconciles,
            notifications,
            snapshots,
        }
    }

    pub fn reconciled(&self, outcome: Outcome) {
        self.reconciles
            .get_or_create(&ResultLabels {
                result: outcome.as_str().to_string(),
            })
            .inc();
    }

    pub fn notified(&self) {
        self.notifications.inc();
    }

    pub fn set_snapshots(&self, count: usize) {
        self.snapshots.set(count as i64);
    }

    #[cfg(test)]
    pub(crate) fn reconcile_count(&self, outcome: Outcome) -> u64 {
        self.reconciles
            .get_or_create(&ResultLabels {
                result: outcome.as_str().to_string(),
            })
            .get()
    }

    #[cfg(test)]
    pub(crate) fn notification_count(&self) -> u64 {
        self.notifications.get()
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::register(&mut Registry::default())
    }
}

// === impl Outcome ===

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Retry => "retry",
            Self::Invalid => "invalid",
        }
    }
}

// === impl WatchMetrics ===

impl WatchMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let applies = Family::default();
        prom.register(
            "watch_applies",
            "Count of resources applied from the watch",
            applies.clone(),
        );

        let deletes = Family::default();
        prom.register(
            "watch_deletes",
            "Count of resources deleted from the watch",
            deletes.clone(),
        );

        let resets = Family::default();
        prom.register(
            "watch_resets",
            "Count of watch restarts",
            resets.clone(),
        );

        Self {
            applies,
            deletes,
            resets,
        }
    }

    pub fn applied(&self, kind: &str) {
        self.applies.get_or_create(&KindLabels::new(kind)).inc();
    }

    pub fn deleted(&self, kind: &str) {
        self.deletes.get_or_create(&KindLabels::new(kind)).inc();
    }

    pub fn reset(&self, kind: &str) {
        self.resets.get_or_create(&KindLabels::new(kind)).inc();
    }

    #[cfg(test)]
    pub(crate) fn apply_count(&self, kind: &str) -> u64 {
        self.applies.get_or_create(&KindLabels::new(kind)).get()
    }

    #[cfg(test)]
    pub(crate) fn delete_count(&self, kind: &str) -> u64 {
        self.deletes.get_or_create(&KindLabels::new(kind)).get()
    }

    #[cfg(test)]
    pub(crate) fn reset_count(&self, kind: &str) -> u64 {
        self.resets.get_or_create(&KindLabels::new(kind)).get()
    }
}

impl Default for WatchMetrics {
    fn default() -> Self {
        Self::register(&mut Registry::default())
    }
}

impl KindLabels {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
        }
    }
}
