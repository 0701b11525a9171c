use meshgate_ingress_core::Event;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub struct ConversionMetrics {
    invalid: Family<InvalidLabels, Counter>,
    ingresses: Family<ClusterLabels, Gauge>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct InvalidLabels {
    cluster_id: String,
    event: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ClusterLabels {
    cluster_id: String,
}

// === impl ConversionMetrics ===

impl ConversionMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let invalid = Family::default();
        prom.register(
            "invalid_ingresses",
            "Count of ingress fragments rejected during conversion, by cause",
            invalid.clone(),
        );

        let ingresses = Family::default();
        prom.register(
            "ingresses",
            "Gauge of the number of eligible ingresses",
            ingresses.clone(),
        );

        Self { invalid, ingresses }
    }

    /// Counts a non-`Normal` classification. `Normal` events are ignored.
    pub fn record_invalid(&self, cluster_id: &str, event: Event) {
        if event.is_normal() {
            return;
        }
        self.invalid
            .get_or_create(&InvalidLabels {
                cluster_id: cluster_id.to_string(),
                event: event.to_string(),
            })
            .inc();
    }

    pub fn set_ingresses(&self, cluster_id: &str, count: usize) {
        self.ingresses
            .get_or_create(&ClusterLabels {
                cluster_id: cluster_id.to_string(),
            })
            .set(count as i64);
    }

    #[cfg(test)]
    pub(crate) fn invalid_count(&self, cluster_id: &str, event: Event) -> u64 {
        self.invalid
            .get_or_create(&InvalidLabels {
                cluster_id: cluster_id.to_string(),
                event: event.to_string(),
            })
            .get()
    }

    #[cfg(test)]
    pub(crate) fn ingress_count(&self, cluster_id: &str) -> i64 {
        self.ingresses
            .get_or_create(&ClusterLabels {
                cluster_id: cluster_id.to_string(),
            })
            .get()
    }
}
