//! # Profiler Bootstrap
//!
//! Wires configuration, collaborators and background tasks into a running
//! [`ProfilerSystem`].
//!
//! ## Lifecycle
//!
//! 1. [`ProfilerSystem::connect`] opens the store, queue and history pools and
//!    ensures the owned tables exist. Any failure here is fatal.
//! 2. [`ProfilerSystem::new`] builds the profiler, consumer, reclaimer and
//!    sweeper around a set of [`ProfilerComponents`]. Tests pass in-memory
//!    components here and skip step 1.
//! 3. [`ProfilerSystem::start`] spawns every loop.
//! 4. [`ProfilerSystem::shutdown`] stops fetching, drains in-flight work,
//!    stops the timers and flushes the audit buffer.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::error_router::{error_channel, spawn_error_router, QueueErrorReceiver};
use super::reclaimer::OrphanReclaimer;
use super::session_consumer::{ConsumerHandles, ConsumerSettings, SessionConsumer};
use crate::audit::{AuditLogger, AuditWriterHandle, BatchedAuditLogger, PgAuditSink, TracingAuditLogger};
use crate::config::ConfigManager;
use crate::constants;
use crate::database::{self, schema};
use crate::error::{ProfilerError, ProfilerResult};
use crate::history::{HistorySource, PgHistorySource};
use crate::messaging::{PgWorkQueue, WorkQueue};
use crate::profiling::SessionProfiler;
use crate::store::{PgPriorityStore, PriorityStore, PrioritySweeper};

/// Collaborators the system runs against
pub struct ProfilerComponents {
    pub queue: Arc<dyn WorkQueue>,
    pub history: Arc<dyn HistorySource>,
    pub store: Arc<dyn PriorityStore>,
    pub audit: Arc<dyn AuditLogger>,
    /// Present when audit records are batched to a sink
    pub audit_writer: Option<AuditWriterHandle>,
}

/// Point-in-time view for health reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStatus {
    pub running: bool,
    pub fetching_paused: bool,
    pub in_flight: usize,
    pub acknowledged: u64,
    pub rejected: u64,
    pub unresolved: u64,
}

pub struct ProfilerSystem {
    config: Arc<ConfigManager>,
    consumer: Arc<SessionConsumer>,
    reclaimer: Arc<OrphanReclaimer>,
    sweeper: Arc<PrioritySweeper>,
    audit_writer: Option<AuditWriterHandle>,
    error_receiver: Option<QueueErrorReceiver>,
    error_router: Option<JoinHandle<()>>,
    consumer_handles: Option<ConsumerHandles>,
    background: Vec<JoinHandle<()>>,
}

impl ProfilerSystem {
    /// Open PostgreSQL connections for every collaborator.
    ///
    /// The audit sink shares the history connection pool.
    pub async fn connect(config: &ConfigManager) -> ProfilerResult<ProfilerComponents> {
        let settings = config.config();
        let connections = &settings.connections;

        let queue_pool = database::connect("queue", &connections.queue)
            .await
            .map_err(|e| ProfilerError::Startup(format!("cannot open queue connection: {e}")))?;
        schema::ensure_queue_schema(&queue_pool).await?;

        let store_pool = database::connect("store", &connections.store)
            .await
            .map_err(|e| ProfilerError::Startup(format!("cannot open store connection: {e}")))?;
        schema::ensure_store_schema(&store_pool).await?;

        let history_pool = database::connect("history", &connections.history)
            .await
            .map_err(|e| ProfilerError::Startup(format!("cannot open history connection: {e}")))?;

        let (audit, audit_writer): (Arc<dyn AuditLogger>, Option<AuditWriterHandle>) =
            if settings.audit.enabled {
                schema::ensure_audit_schema(&history_pool).await?;
                let sink = Arc::new(PgAuditSink::new(history_pool.clone()));
                let (logger, writer) = BatchedAuditLogger::spawn(sink, &settings.audit);
                (Arc::new(logger) as Arc<dyn AuditLogger>, Some(writer))
            } else {
                (Arc::new(TracingAuditLogger) as Arc<dyn AuditLogger>, None)
            };

        Ok(ProfilerComponents {
            queue: Arc::new(PgWorkQueue::new(queue_pool, settings.queue.name.clone())),
            history: Arc::new(PgHistorySource::new(history_pool)),
            store: Arc::new(PgPriorityStore::new(
                store_pool,
                settings.profiling.priority_ttl(),
            )),
            audit,
            audit_writer,
        })
    }

    pub fn new(config: Arc<ConfigManager>, components: ProfilerComponents) -> Self {
        let settings = config.config();

        let profiler = Arc::new(SessionProfiler::from_config(
            components.history,
            config.rules().clone(),
            &settings.profiling,
        ));

        let (error_sender, error_receiver) = error_channel(constants::queue::ERROR_CHANNEL_CAPACITY);

        let consumer = Arc::new(SessionConsumer::new(
            Arc::clone(&components.queue),
            profiler,
            Arc::clone(&components.store),
            components.audit,
            error_sender,
            ConsumerSettings::from(&settings.queue),
        ));

        let reclaimer = Arc::new(OrphanReclaimer::new(
            components.queue,
            settings.queue.liveness_window(),
            settings.queue.reclaim_interval(),
        ));

        let sweeper = Arc::new(PrioritySweeper::new(
            components.store,
            settings.profiling.purge_interval(),
        ));

        Self {
            config,
            consumer,
            reclaimer,
            sweeper,
            audit_writer: components.audit_writer,
            error_receiver: Some(error_receiver),
            error_router: None,
            consumer_handles: None,
            background: Vec::new(),
        }
    }

    /// Connect and build in one step
    pub async fn bootstrap(config: Arc<ConfigManager>) -> ProfilerResult<Self> {
        let components = Self::connect(&config).await?;
        Ok(Self::new(config, components))
    }

    pub fn start(&mut self) {
        if self.consumer_handles.is_some() {
            warn!("Profiler system already started");
            return;
        }

        info!(
            environment = %self.config.environment(),
            rule_count = self.config.rules().len(),
            "🚀 Starting profiler system"
        );

        if let Some(receiver) = self.error_receiver.take() {
            self.error_router = Some(spawn_error_router(receiver));
        }
        self.consumer_handles = Some(self.consumer.start());
        self.background.push(self.reclaimer.start());
        self.background.push(self.sweeper.start());
    }

    pub async fn shutdown(mut self) {
        info!("🛑 Shutting down profiler system");

        self.consumer.stop().await;
        self.reclaimer.stop();
        self.sweeper.stop();

        if let Some(handles) = self.consumer_handles.take() {
            let results = join_all([handles.polling, handles.heartbeat]).await;
            for (name, result) in ["polling", "heartbeat"].into_iter().zip(results) {
                if let Err(e) = result {
                    error!(task = name, error = %e, "Consumer task failed");
                }
            }
        }

        // Timer loops exit on their next tick
        for handle in self.background.drain(..) {
            handle.abort();
        }

        if let Some(writer) = self.audit_writer.take() {
            writer.shutdown().await;
        }

        // The router ends once the consumer and its in-flight tasks drop their senders
        let router = self.error_router.take();
        drop(self);
        if let Some(router) = router {
            if tokio::time::timeout(Duration::from_secs(1), router).await.is_err() {
                warn!("Queue error router did not stop in time");
            }
        }

        info!("Profiler system stopped");
    }

    pub fn status(&self) -> SystemStatus {
        let stats = self.consumer.get_stats();
        SystemStatus {
            running: self.consumer.is_running(),
            fetching_paused: self.consumer.is_fetching_paused(),
            in_flight: self.consumer.in_flight_count(),
            acknowledged: stats.get_acknowledged(),
            rejected: stats.get_rejected(),
            unresolved: stats.get_unresolved(),
        }
    }

    pub fn consumer(&self) -> &Arc<SessionConsumer> {
        &self.consumer
    }

    pub fn reclaimer(&self) -> &Arc<OrphanReclaimer> {
        &self.reclaimer
    }

    pub fn config(&self) -> &Arc<ConfigManager> {
        &self.config
    }
}
