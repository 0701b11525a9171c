use crate::distribution::PushCounters;
use parking_lot::Mutex;
use tokio::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tracks whether the initial state observed by the watches has been pushed.
///
/// When the caches first report synced, the number of change notifications received so far is
/// captured. The controller is ready once at least that many notifications have been committed.
#[derive(Debug, Default)]
pub struct Readiness {
    expected: Mutex<Option<i64>>,
}

// === impl Readiness ===

impl Readiness {
    pub fn check(&self, caches_synced: bool, counters: &PushCounters) -> bool {
        if !caches_synced {
            return false;
        }
        let expected = *self
            .expected
            .lock()
            .get_or_insert_with(|| counters.inbound());
        counters.committed() >= expected
    }

    /// Returns the inbound count captured when the caches synced, if they have.
    pub fn expected(&self) -> Option<i64> {
        *self.expected.lock()
    }

    /// Polls until ready, then drops `handle`. Gives up if shutdown is signaled first.
    pub async fn release_when_ready<H>(
        self,
        caches_synced: impl Fn() -> bool,
        counters: &PushCounters,
        handle: H,
        drain: drain::Watch,
    ) {
        let ready = async {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if self.check(caches_synced(), counters) {
                    return;
                }
            }
        };

        tokio::select! {
            _ = ready => {
                tracing::info!(
                    committed = counters.committed(),
                    expected = ?self.expected(),
                    "Initial configuration pushed"
                );
                drop(handle);
            }
            _ = drain.signaled() => {
                tracing::debug!("Shutdown before ready");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    #[test]
    fn not_ready_until_caches_sync() {
        let readiness = Readiness::default();
        let counters = PushCounters::default();
        assert!(!readiness.check(false, &counters));
        assert_eq!(readiness.expected(), None);
        assert!(readiness.check(true, &counters));
    }

    #[test]
    fn waits_for_counts_observed_at_sync() {
        let readiness = Readiness::default();
        let counters = PushCounters::default();
        for _ in 0..3 {
            counters.record_inbound();
        }

        assert!(!readiness.check(true, &counters));
        assert_eq!(readiness.expected(), Some(3));

        // Notifications after the sync do not move the target.
        counters.record_inbound();
        counters.commit(2);
        assert!(!readiness.check(true, &counters));

        counters.commit(1);
        assert!(readiness.check(true, &counters));

        counters.commit(5);
        assert!(readiness.check(true, &counters));
    }

    #[tokio::test(start_paused = true)]
    async fn releases_handle_once_ready() {
        let counters = Arc::new(PushCounters::default());
        counters.record_inbound();
        let synced = Arc::new(AtomicBool::new(false));
        let (handle_tx, mut handle_rx) = tokio::sync::oneshot::channel::<()>();
        let (_signal, drain) = drain::channel();

        let task = tokio::spawn({
            let counters = counters.clone();
            let synced = synced.clone();
            async move {
                Readiness::default()
                    .release_when_ready(
                        move || synced.load(Ordering::Acquire),
                        &counters,
                        handle_tx,
                        drain,
                    )
                    .await
            }
        });

        tokio::time::sleep(POLL_INTERVAL * 3).await;
        assert!(handle_rx.try_recv().is_err());
        assert!(!task.is_finished());

        synced.store(true, Ordering::Release);
        tokio::time::sleep(POLL_INTERVAL * 3).await;
        assert!(!task.is_finished(), "one notification is still uncommitted");

        counters.commit(1);
        task.await.expect("task must not panic");
        assert!(matches!(
            handle_rx.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Closed)
        ));
    }
}
