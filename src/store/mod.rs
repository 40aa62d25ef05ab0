//! # Priority Store
//!
//! Persists the latest priority per session with a bounded lifetime. Writes
//! are upserts: re-profiling a session replaces its priority and refreshes
//! the expiry. Expired entries are invisible to readers and removed by the
//! [`PrioritySweeper`].

pub mod in_memory;
pub mod postgres;
pub mod sweeper;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::priority::Priority;

pub use in_memory::InMemoryPriorityStore;
pub use postgres::PgPriorityStore;
pub use sweeper::PrioritySweeper;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to persist priority for session {session_id}: {message}")]
    Write { session_id: String, message: String },

    #[error("Failed to read priority for session {session_id}: {message}")]
    Read { session_id: String, message: String },

    #[error("Failed to purge expired priorities: {message}")]
    Purge { message: String },

    #[error("Stored priority '{value}' for session {session_id} is not recognized")]
    InvalidValue { session_id: String, value: String },
}

impl StoreError {
    pub fn write(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    pub fn read(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Read {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    pub fn purge(message: impl Into<String>) -> Self {
        Self::Purge {
            message: message.into(),
        }
    }
}

/// Keyed priority storage with expiry
#[async_trait]
pub trait PriorityStore: Send + Sync + 'static {
    /// Upsert `priority` for `session_id`, expiring after [`PriorityStore::ttl`]
    async fn set(&self, session_id: &str, priority: Priority) -> Result<(), StoreError>;

    /// Current, unexpired priority for `session_id`
    async fn get(&self, session_id: &str) -> Result<Option<Priority>, StoreError>;

    /// Remove expired entries, returning how many were removed
    async fn purge_expired(&self) -> Result<u64, StoreError>;

    fn ttl(&self) -> Duration;

    fn store_name(&self) -> &'static str;
}
