//! # Audit Logging
//!
//! Fire-and-forget record of every classification, for analytics and
//! debugging. [`AuditLogger::log_profile`] never blocks and never fails the
//! caller: audit loss is acceptable, stalling the consumer is not.
//!
//! [`BatchedAuditLogger`] buffers records on a bounded channel and a writer
//! task flushes them to an [`AuditSink`] by size or on a timer.

pub mod batched;
pub mod postgres;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::info;

use crate::profiling::ClassificationResult;

pub use batched::{AuditWriterHandle, BatchedAuditLogger};
pub use postgres::PgAuditSink;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to write {count} audit records: {message}")]
    Write { count: usize, message: String },
}

impl AuditError {
    pub fn write(count: usize, message: impl Into<String>) -> Self {
        Self::Write {
            count,
            message: message.into(),
        }
    }
}

/// Non-blocking, infallible audit entry point used by the consumer
pub trait AuditLogger: Send + Sync + 'static {
    fn log_profile(&self, result: &ClassificationResult);
}

/// Destination for batches of audit records
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn write_batch(&self, records: &[ClassificationResult]) -> Result<(), AuditError>;

    fn sink_name(&self) -> &'static str;
}

/// Audit logger that only emits a structured log line per classification.
/// Used when audit persistence is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log_profile(&self, result: &ClassificationResult) {
        info!(
            session_id = %result.session_id,
            priority = %result.priority,
            evaluated_at = %result.evaluated_at.to_rfc3339(),
            "Session profiled"
        );
    }
}

/// Sink that keeps records in memory
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<ClassificationResult>>,
    batches: Mutex<Vec<usize>>,
    fail: AtomicBool,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<ClassificationResult> {
        self.records.lock().clone()
    }

    /// Size of each batch written, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn write_batch(&self, records: &[ClassificationResult]) -> Result<(), AuditError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuditError::write(records.len(), "in-memory sink failing"));
        }
        self.records.lock().extend_from_slice(records);
        self.batches.lock().push(records.len());
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "in_memory"
    }
}

/// Audit logger that appends directly to memory; handy for assertions
#[derive(Debug, Default)]
pub struct RecordingAuditLogger {
    records: Mutex<Vec<ClassificationResult>>,
}

impl RecordingAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ClassificationResult> {
        self.records.lock().clone()
    }
}

impl AuditLogger for RecordingAuditLogger {
    fn log_profile(&self, result: &ClassificationResult) {
        self.records.lock().push(result.clone());
    }
}
