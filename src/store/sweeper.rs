//! Periodic purge of expired priorities.
//!
//! Readers already ignore expired rows; the sweeper only keeps storage from
//! growing without bound.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{PriorityStore, StoreError};

#[derive(Debug, Default)]
pub struct SweeperStats {
    pub cycles: AtomicU64,
    pub purged: AtomicU64,
    pub errors: AtomicU64,
}

pub struct PrioritySweeper {
    store: Arc<dyn PriorityStore>,
    interval: Duration,
    is_running: AtomicBool,
    stats: SweeperStats,
}

impl std::fmt::Debug for PrioritySweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrioritySweeper")
            .field("store", &self.store.store_name())
            .field("interval", &self.interval)
            .field("is_running", &self.is_running.load(Ordering::Relaxed))
            .finish()
    }
}

impl PrioritySweeper {
    pub fn new(store: Arc<dyn PriorityStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            is_running: AtomicBool::new(false),
            stats: SweeperStats::default(),
        }
    }

    /// Purge once, updating stats
    pub async fn sweep_once(&self) -> Result<u64, StoreError> {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        match self.store.purge_expired().await {
            Ok(purged) => {
                self.stats.purged.fetch_add(purged, Ordering::Relaxed);
                debug!(
                    purged,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Expired priorities purged"
                );
                Ok(purged)
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.is_running.store(true, Ordering::SeqCst);
        let sweeper = Arc::clone(self);

        info!(interval = ?self.interval, store = self.store.store_name(), "Starting PrioritySweeper");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweeper.interval);
            // The first tick completes immediately; skip it so startup is quiet
            interval.tick().await;

            while sweeper.is_running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !sweeper.is_running.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = sweeper.sweep_once().await {
                    error!(error = %e, "Failed to purge expired priorities");
                }
            }

            info!("PrioritySweeper stopped");
        })
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &SweeperStats {
        &self.stats
    }
}
