//! # Work Queue Trait
//!
//! Provider-agnostic contract for the reliable session queue.
//!
//! ## Delivery lifecycle
//!
//! ```text
//! ready --fetch--> unacked --ack----> (removed)
//!                     |   --reject-> rejected
//!                     |
//!                     +-- heartbeat lapses --reclaim--> ready (front of queue)
//! ```
//!
//! A delivery stays `unacked` while its consumer keeps heartbeating it.
//! Acknowledging or rejecting a delivery the caller does not hold fails with
//! [`QueueError::DeliveryNotFound`].

use async_trait::async_trait;
use std::time::Duration;

use super::errors::QueueError;
use super::types::{ConsumerId, DeliveryHandle, QueueStats, WorkItem};

#[async_trait]
pub trait WorkQueue: Send + Sync + 'static {
    fn queue_name(&self) -> &str;

    /// Enqueue a session for profiling
    async fn publish(&self, session_id: &str) -> Result<DeliveryHandle, QueueError>;

    /// Take up to `max` ready deliveries for `consumer`, oldest first.
    /// Fetched deliveries start with a fresh heartbeat.
    async fn fetch(&self, consumer: &ConsumerId, max: usize) -> Result<Vec<WorkItem>, QueueError>;

    async fn ack(&self, consumer: &ConsumerId, handle: &DeliveryHandle) -> Result<(), QueueError>;

    async fn reject(&self, consumer: &ConsumerId, handle: &DeliveryHandle)
        -> Result<(), QueueError>;

    /// Refresh the heartbeat of the given deliveries held by `consumer`.
    /// Handles no longer held are skipped; returns how many were refreshed.
    async fn heartbeat(
        &self,
        consumer: &ConsumerId,
        handles: &[DeliveryHandle],
    ) -> Result<u64, QueueError>;

    /// Return deliveries whose heartbeat is older than `liveness_window` to
    /// the front of the ready queue; returns how many were reclaimed
    async fn reclaim_orphans(&self, liveness_window: Duration) -> Result<u64, QueueError>;

    async fn stats(&self) -> Result<QueueStats, QueueError>;

    fn provider_name(&self) -> &'static str;
}
