//! # Orphan Reclaimer
//!
//! Returns deliveries whose heartbeat has lapsed to the front of the queue.
//! Runs on its own timer and never touches in-process consumer state; it
//! only changes queue membership.
//!
//! Any reclaim is logged as a warning: it means a consumer died or left a
//! delivery unresolved, which operators want to see.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::messaging::{QueueError, WorkQueue};

#[derive(Debug, Default)]
pub struct ReclaimerStats {
    pub cycles: AtomicU64,
    pub reclaimed: AtomicU64,
    pub errors: AtomicU64,
}

pub struct OrphanReclaimer {
    queue: Arc<dyn WorkQueue>,
    liveness_window: Duration,
    interval: Duration,
    is_running: AtomicBool,
    stats: ReclaimerStats,
}

impl std::fmt::Debug for OrphanReclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrphanReclaimer")
            .field("queue", &self.queue.queue_name())
            .field("liveness_window", &self.liveness_window)
            .field("interval", &self.interval)
            .field("is_running", &self.is_running.load(Ordering::Relaxed))
            .finish()
    }
}

impl OrphanReclaimer {
    pub fn new(queue: Arc<dyn WorkQueue>, liveness_window: Duration, interval: Duration) -> Self {
        Self {
            queue,
            liveness_window,
            interval,
            is_running: AtomicBool::new(false),
            stats: ReclaimerStats::default(),
        }
    }

    /// One reclaim pass
    pub async fn reclaim_once(&self) -> Result<u64, QueueError> {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        let reclaimed = self
            .queue
            .reclaim_orphans(self.liveness_window)
            .await
            .inspect_err(|_| {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
            })?;

        if reclaimed > 0 {
            self.stats.reclaimed.fetch_add(reclaimed, Ordering::Relaxed);
            warn!(
                queue = %self.queue.queue_name(),
                reclaimed,
                liveness_window = ?self.liveness_window,
                "⚠️ Reclaimed orphaned deliveries"
            );
        }

        Ok(reclaimed)
    }

    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        info!(
            queue = %self.queue.queue_name(),
            interval = ?self.interval,
            liveness_window = ?self.liveness_window,
            "Starting OrphanReclaimer"
        );
        self.is_running.store(true, Ordering::SeqCst);
        let reclaimer = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(reclaimer.interval);

            while reclaimer.is_running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !reclaimer.is_running.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = reclaimer.reclaim_once().await {
                    error!(error = %e, "Failed to reclaim orphaned deliveries");
                }
            }

            debug!("OrphanReclaimer stopped");
        })
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &ReclaimerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{ConsumerId, InMemoryWorkQueue};

    #[tokio::test]
    async fn test_reclaim_once_counts() {
        let queue = Arc::new(InMemoryWorkQueue::new("sessions"));
        queue.publish("s1").await.unwrap();
        queue.fetch(&ConsumerId::new("dead"), 1).await.unwrap();

        let reclaimer = OrphanReclaimer::new(
            queue.clone(),
            Duration::from_millis(10),
            Duration::from_secs(1),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(reclaimer.reclaim_once().await.unwrap(), 1);
        assert_eq!(reclaimer.stats().reclaimed.load(Ordering::Relaxed), 1);
        assert_eq!(queue.ready_session_ids(), vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_live_delivery_is_not_reclaimed() {
        let queue = Arc::new(InMemoryWorkQueue::new("sessions"));
        queue.publish("s1").await.unwrap();
        queue.fetch(&ConsumerId::new("live"), 1).await.unwrap();

        let reclaimer =
            OrphanReclaimer::new(queue.clone(), Duration::from_secs(60), Duration::from_secs(1));
        assert_eq!(reclaimer.reclaim_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_background_loop_stops() {
        let queue = Arc::new(InMemoryWorkQueue::new("sessions"));
        let reclaimer = Arc::new(OrphanReclaimer::new(
            queue,
            Duration::from_millis(10),
            Duration::from_millis(10),
        ));

        let handle = reclaimer.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        reclaimer.stop();
        handle.await.unwrap();

        assert!(reclaimer.stats().cycles.load(Ordering::Relaxed) >= 1);
    }
}
