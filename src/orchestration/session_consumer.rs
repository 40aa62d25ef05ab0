//! # Session Consumer
//!
//! Pulls session ids off the [`WorkQueue`], profiles each one and resolves the
//! delivery.
//!
//! ## Per-delivery outcome
//!
//! | Step                   | Result                                   |
//! |------------------------|------------------------------------------|
//! | history read fails     | [`DeliveryOutcome::Unresolved`]          |
//! | priority write fails   | reject, [`DeliveryOutcome::Rejected`]    |
//! | priority written       | ack, [`DeliveryOutcome::Acknowledged`]   |
//!
//! Unresolved deliveries drop out of the heartbeat set, so the reclaimer
//! returns them to the queue once the liveness window lapses.
//!
//! ## Concurrency
//!
//! A semaphore with `prefetch_limit` permits bounds in-flight deliveries.
//! The poll loop only fetches as many deliveries as it holds permits for,
//! and each delivery runs on its own task holding one permit. A separate
//! heartbeat loop refreshes every in-flight delivery.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::error_router::{report, QueueErrorSender};
use crate::audit::AuditLogger;
use crate::config::QueueConfig;
use crate::logging::log_session_operation;
use crate::messaging::{ConsumerId, DeliveryHandle, DeliveryOutcome, QueueError, WorkItem, WorkQueue};
use crate::profiling::SessionProfiler;
use crate::store::PriorityStore;

/// Runtime settings for one consumer
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub consumer_tag: String,
    pub prefetch_limit: usize,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_error_limit: u32,
    pub shutdown_timeout: Duration,
}

impl From<&QueueConfig> for ConsumerSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            consumer_tag: config.consumer_tag.clone(),
            prefetch_limit: config.prefetch_limit,
            poll_interval: config.poll_interval(),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_error_limit: config.heartbeat_error_limit,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

/// Statistics for consumer observability
#[derive(Debug, Default)]
pub struct ConsumerStats {
    pub polling_cycles: AtomicU64,
    pub fetched: AtomicU64,
    pub acknowledged: AtomicU64,
    pub rejected: AtomicU64,
    pub unresolved: AtomicU64,
    pub classification_failures: AtomicU64,
    pub persistence_failures: AtomicU64,
    pub consume_errors: AtomicU64,
    pub heartbeat_failures: AtomicU64,
}

impl ConsumerStats {
    pub fn get_fetched(&self) -> u64 {
        self.fetched.load(Ordering::Relaxed)
    }

    pub fn get_acknowledged(&self) -> u64 {
        self.acknowledged.load(Ordering::Relaxed)
    }

    pub fn get_rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn get_unresolved(&self) -> u64 {
        self.unresolved.load(Ordering::Relaxed)
    }

    pub fn get_heartbeat_failures(&self) -> u64 {
        self.heartbeat_failures.load(Ordering::Relaxed)
    }
}

/// Background loop handles returned by [`SessionConsumer::start`]
#[derive(Debug)]
pub struct ConsumerHandles {
    pub polling: JoinHandle<()>,
    pub heartbeat: JoinHandle<()>,
}

pub struct SessionConsumer {
    consumer_id: ConsumerId,
    queue: Arc<dyn WorkQueue>,
    profiler: Arc<SessionProfiler>,
    store: Arc<dyn PriorityStore>,
    audit: Arc<dyn AuditLogger>,
    errors: QueueErrorSender,
    settings: ConsumerSettings,
    permits: Arc<Semaphore>,
    /// Deliveries currently being processed; the heartbeat set
    in_flight: DashMap<DeliveryHandle, String>,
    running: AtomicBool,
    heartbeating: AtomicBool,
    fetching_paused: AtomicBool,
    consecutive_heartbeat_failures: AtomicU32,
    stats: Arc<ConsumerStats>,
}

impl std::fmt::Debug for SessionConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConsumer")
            .field("consumer_id", &self.consumer_id)
            .field("queue", &self.queue.queue_name())
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight.len())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl SessionConsumer {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        profiler: Arc<SessionProfiler>,
        store: Arc<dyn PriorityStore>,
        audit: Arc<dyn AuditLogger>,
        errors: QueueErrorSender,
        settings: ConsumerSettings,
    ) -> Self {
        let prefetch_limit = settings.prefetch_limit.max(1);
        Self {
            consumer_id: ConsumerId::generate(&settings.consumer_tag),
            queue,
            profiler,
            store,
            audit,
            errors,
            permits: Arc::new(Semaphore::new(prefetch_limit)),
            settings: ConsumerSettings {
                prefetch_limit,
                ..settings
            },
            in_flight: DashMap::new(),
            running: AtomicBool::new(false),
            heartbeating: AtomicBool::new(false),
            fetching_paused: AtomicBool::new(false),
            consecutive_heartbeat_failures: AtomicU32::new(0),
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn consumer_id(&self) -> &ConsumerId {
        &self.consumer_id
    }

    pub fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_fetching_paused(&self) -> bool {
        self.fetching_paused.load(Ordering::SeqCst)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn get_stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Spawn the polling and heartbeat loops
    #[instrument(skip(self), fields(consumer = %self.consumer_id))]
    pub fn start(self: &Arc<Self>) -> ConsumerHandles {
        info!(
            queue = %self.queue.queue_name(),
            provider = self.queue.provider_name(),
            prefetch_limit = self.settings.prefetch_limit,
            poll_interval = ?self.settings.poll_interval,
            "🚀 Starting session consumer"
        );

        self.running.store(true, Ordering::SeqCst);
        self.heartbeating.store(true, Ordering::SeqCst);

        ConsumerHandles {
            polling: tokio::spawn(Arc::clone(self).polling_loop()),
            heartbeat: tokio::spawn(Arc::clone(self).heartbeat_loop()),
        }
    }

    /// Stop fetching, wait (bounded) for in-flight deliveries, then stop
    /// heart-beating. Deliveries still running after the timeout are left to
    /// the reclaimer. A stopped consumer is not restartable.
    #[instrument(skip(self), fields(consumer = %self.consumer_id))]
    pub async fn stop(&self) {
        info!("Stopping session consumer");
        self.running.store(false, Ordering::SeqCst);

        let all = u32::try_from(self.settings.prefetch_limit).unwrap_or(u32::MAX);
        match tokio::time::timeout(self.settings.shutdown_timeout, self.permits.acquire_many(all))
            .await
        {
            Ok(Ok(_permits)) => debug!("All in-flight deliveries resolved"),
            Ok(Err(_)) => debug!("Consumer semaphore closed"),
            Err(_) => warn!(
                in_flight = self.in_flight.len(),
                timeout = ?self.settings.shutdown_timeout,
                "Shutdown timeout reached with deliveries in flight; they will be reclaimed"
            ),
        }

        // A poll that passed its running check before the flag flipped finds
        // no permits and fetches nothing
        self.permits.close();

        self.heartbeating.store(false, Ordering::SeqCst);
        info!(
            acknowledged = self.stats.get_acknowledged(),
            rejected = self.stats.get_rejected(),
            unresolved = self.stats.get_unresolved(),
            "Session consumer stopped"
        );
    }

    async fn polling_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.settings.poll_interval);

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.stats.polling_cycles.fetch_add(1, Ordering::Relaxed);

            if self.fetching_paused.load(Ordering::SeqCst) {
                continue;
            }

            if let Err(e) = self.poll_once().await {
                self.stats.consume_errors.fetch_add(1, Ordering::Relaxed);
                report(&self.errors, e);
            }
        }

        debug!(consumer = %self.consumer_id, "Polling loop exited");
    }

    /// Fetch as many deliveries as there are free permits and dispatch each
    /// to its own task. Returns how many were dispatched.
    pub async fn poll_once(self: &Arc<Self>) -> Result<usize, QueueError> {
        let mut permits: Vec<OwnedSemaphorePermit> = Vec::new();
        while permits.len() < self.settings.prefetch_limit {
            match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => permits.push(permit),
                Err(_) => break,
            }
        }
        if permits.is_empty() {
            return Ok(0);
        }

        let items = self.queue.fetch(&self.consumer_id, permits.len()).await?;
        let dispatched = items.len();
        if dispatched > 0 {
            self.stats
                .fetched
                .fetch_add(dispatched as u64, Ordering::Relaxed);
            debug!(consumer = %self.consumer_id, count = dispatched, "Fetched deliveries");
        }

        // Unused permits are released when the drain is dropped
        for (item, permit) in items.into_iter().zip(permits.drain(..)) {
            self.in_flight
                .insert(item.handle.clone(), item.session_id.clone());
            let consumer = Arc::clone(self);
            tokio::spawn(async move {
                let _permit = permit;
                consumer.process_delivery(item).await;
            });
        }

        Ok(dispatched)
    }

    /// Profile one delivery and resolve it
    #[instrument(
        skip(self, item),
        fields(session_id = %item.session_id, handle = %item.handle, delivery = item.delivery_count)
    )]
    pub async fn process_delivery(&self, item: WorkItem) -> DeliveryOutcome {
        let outcome = self.resolve(&item).await;
        self.in_flight.remove(&item.handle);

        let counter = match outcome {
            DeliveryOutcome::Acknowledged => &self.stats.acknowledged,
            DeliveryOutcome::Rejected => &self.stats.rejected,
            DeliveryOutcome::Unresolved => &self.stats.unresolved,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        outcome
    }

    async fn resolve(&self, item: &WorkItem) -> DeliveryOutcome {
        let session_id = item.session_id.as_str();

        let result = match self.profiler.classify(session_id).await {
            Ok(result) => result,
            Err(e) => {
                self.stats
                    .classification_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    session_id = %session_id,
                    handle = %item.handle,
                    error = %e,
                    "Failed to profile session; leaving delivery for reclaim"
                );
                return DeliveryOutcome::Unresolved;
            }
        };

        self.audit.log_profile(&result);

        if let Err(e) = self.store.set(session_id, result.priority).await {
            self.stats
                .persistence_failures
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                session_id = %session_id,
                handle = %item.handle,
                priority = %result.priority,
                error = %e,
                "Failed to persist priority; rejecting delivery"
            );
            return match self.queue.reject(&self.consumer_id, &item.handle).await {
                Ok(()) => DeliveryOutcome::Rejected,
                Err(qe) => {
                    report(&self.errors, qe);
                    DeliveryOutcome::Unresolved
                }
            };
        }

        match self.queue.ack(&self.consumer_id, &item.handle).await {
            Ok(()) => {
                log_session_operation(
                    "profile",
                    session_id,
                    "acknowledged",
                    Some(result.priority.as_str()),
                );
                DeliveryOutcome::Acknowledged
            }
            Err(qe) => {
                report(&self.errors, qe);
                DeliveryOutcome::Unresolved
            }
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.settings.heartbeat_interval);

        while self.heartbeating.load(Ordering::SeqCst) {
            interval.tick().await;
            if !self.heartbeating.load(Ordering::SeqCst) {
                break;
            }
            self.heartbeat_once().await;
        }

        debug!(consumer = %self.consumer_id, "Heartbeat loop exited");
    }

    /// Refresh liveness of every in-flight delivery.
    ///
    /// Consecutive failures are counted; at the configured limit the consumer
    /// stops fetching until a heartbeat succeeds again.
    pub async fn heartbeat_once(&self) {
        let handles: Vec<DeliveryHandle> =
            self.in_flight.iter().map(|entry| entry.key().clone()).collect();

        match self.queue.heartbeat(&self.consumer_id, &handles).await {
            Ok(refreshed) => {
                self.consecutive_heartbeat_failures
                    .store(0, Ordering::SeqCst);
                if self.fetching_paused.swap(false, Ordering::SeqCst) {
                    info!(
                        consumer = %self.consumer_id,
                        "Heartbeat recovered, resuming fetching"
                    );
                }
                if refreshed > 0 {
                    debug!(refreshed, "Heartbeat sent");
                }
            }
            Err(e) => {
                self.stats.heartbeat_failures.fetch_add(1, Ordering::Relaxed);
                let count = self
                    .consecutive_heartbeat_failures
                    .fetch_add(1, Ordering::SeqCst)
                    .saturating_add(1);
                let limit = self.settings.heartbeat_error_limit;

                let err = QueueError::heartbeat(count, limit, e.to_string());
                if err.is_heartbeat_limit() {
                    self.fetching_paused.store(true, Ordering::SeqCst);
                }
                report(&self.errors, err);
            }
        }
    }
}
