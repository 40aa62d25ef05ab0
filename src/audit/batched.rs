//! Channel-buffered audit logger with a background batch writer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AuditLogger, AuditSink};
use crate::config::AuditConfig;
use crate::logging::log_error;
use crate::profiling::ClassificationResult;

#[derive(Debug, Default)]
pub struct AuditStats {
    pub enqueued: AtomicU64,
    pub dropped: AtomicU64,
    pub written: AtomicU64,
    pub failed: AtomicU64,
}

/// Sending half: cheap, non-blocking, shared by every consumer task
#[derive(Debug)]
pub struct BatchedAuditLogger {
    sender: mpsc::Sender<ClassificationResult>,
    stats: Arc<AuditStats>,
}

/// Owns the writer task; call [`AuditWriterHandle::shutdown`] to flush
#[derive(Debug)]
pub struct AuditWriterHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
    stats: Arc<AuditStats>,
}

impl BatchedAuditLogger {
    /// Spawn the writer task and return the logger feeding it
    pub fn spawn(sink: Arc<dyn AuditSink>, config: &AuditConfig) -> (Self, AuditWriterHandle) {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        let stats = Arc::new(AuditStats::default());
        let shutdown = Arc::new(Notify::new());

        let writer = AuditWriter {
            sink,
            receiver,
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval(),
            shutdown: Arc::clone(&shutdown),
            stats: Arc::clone(&stats),
        };

        info!(
            batch_size = writer.batch_size,
            flush_interval_ms = writer.flush_interval.as_millis() as u64,
            sink = writer.sink.sink_name(),
            "Starting audit writer"
        );

        let join = tokio::spawn(writer.run());

        (
            Self {
                sender,
                stats: Arc::clone(&stats),
            },
            AuditWriterHandle {
                shutdown,
                join,
                stats,
            },
        )
    }

    pub fn stats(&self) -> &AuditStats {
        &self.stats
    }
}

impl AuditLogger for BatchedAuditLogger {
    fn log_profile(&self, result: &ClassificationResult) {
        match self.sender.try_send(result.clone()) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    session_id = %dropped.session_id,
                    "Audit buffer full, dropping record"
                );
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    session_id = %dropped.session_id,
                    "Audit writer stopped, dropping record"
                );
            }
        }
    }
}

impl AuditWriterHandle {
    /// Flush buffered records and stop the writer
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.join.await {
            error!(error = %e, "Audit writer task failed");
        }
    }

    pub fn stats(&self) -> &AuditStats {
        &self.stats
    }
}

struct AuditWriter {
    sink: Arc<dyn AuditSink>,
    receiver: mpsc::Receiver<ClassificationResult>,
    batch_size: usize,
    flush_interval: Duration,
    shutdown: Arc<Notify>,
    stats: Arc<AuditStats>,
}

impl AuditWriter {
    async fn run(mut self) {
        let mut buffer = Vec::with_capacity(self.batch_size);
        let mut ticker = tokio::time::interval(self.flush_interval);

        loop {
            tokio::select! {
                received = self.receiver.recv() => match received {
                    Some(record) => {
                        buffer.push(record);
                        if buffer.len() >= self.batch_size {
                            self.flush(&mut buffer).await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
                _ = self.shutdown.notified() => {
                    self.receiver.close();
                    while let Some(record) = self.receiver.recv().await {
                        buffer.push(record);
                        if buffer.len() >= self.batch_size {
                            self.flush(&mut buffer).await;
                        }
                    }
                    break;
                }
            }
        }

        if !buffer.is_empty() {
            self.flush(&mut buffer).await;
        }
        info!("Audit writer stopped");
    }

    async fn flush(&self, buffer: &mut Vec<ClassificationResult>) {
        let count = buffer.len();
        match self.sink.write_batch(buffer).await {
            Ok(()) => {
                self.stats.written.fetch_add(count as u64, Ordering::Relaxed);
                debug!(count, "Audit batch written");
            }
            Err(e) => {
                self.stats.failed.fetch_add(count as u64, Ordering::Relaxed);
                log_error(
                    "audit",
                    "write_batch",
                    &e.to_string(),
                    Some(&format!("{count} records dropped")),
                );
            }
        }
        buffer.clear();
    }
}
