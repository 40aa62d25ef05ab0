//! # Work Queue Types
//!
//! Identifiers and payloads shared by every [`super::WorkQueue`] provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one consumer connection; deliveries are owned by a consumer
/// until acknowledged, rejected or reclaimed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId(pub String);

impl ConsumerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Unique id derived from a human-readable consumer tag
    pub fn generate(tag: &str) -> Self {
        Self(format!("{tag}-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for acknowledging or heartbeating a single delivery
///
/// Provider-specific: the queue row id for PostgreSQL, an internal counter
/// for the in-memory provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryHandle(pub String);

impl DeliveryHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DeliveryHandle {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for DeliveryHandle {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// A delivered session awaiting profiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Opaque session identifier carried as the payload
    pub session_id: String,
    pub handle: DeliveryHandle,
    /// 1 on first delivery, incremented on each redelivery
    pub delivery_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// How a delivery was resolved by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    /// Priority persisted and the delivery removed from the queue
    Acknowledged,
    /// Priority could not be stored; the delivery is moved to the rejected set
    Rejected,
    /// Left unacknowledged (history unreadable, or the ack or reject itself
    /// failed); it will be reclaimed once its heartbeat lapses
    Unresolved,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acknowledged => "acknowledged",
            Self::Rejected => "rejected",
            Self::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time queue depth by delivery state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub ready: u64,
    pub unacked: u64,
    pub rejected: u64,
}

impl QueueStats {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..Default::default()
        }
    }
}
