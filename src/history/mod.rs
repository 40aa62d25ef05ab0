//! # Session History
//!
//! Read side of the profiler: reconstructs the requests a session made within
//! a trailing time window. The storage engine behind it is interchangeable;
//! only the read contract matters here.
//!
//! An empty result means the session has no recorded requests in the window.
//! A query failure is always an `Err`, never an empty vector, so callers can
//! tell "no data" apart from "could not read".

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use in_memory::InMemoryHistorySource;
pub use postgres::PgHistorySource;

/// One request observed for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequestEvent {
    pub method: String,
    /// Always begins with `/`
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

impl SessionRequestEvent {
    /// Build an event, normalizing the path to a leading `/`
    pub fn new(method: impl Into<String>, path: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            method: method.into(),
            path: normalize_path(path),
            timestamp,
        }
    }
}

/// Prepend a `/` to paths that lack one. Paths already rooted are unchanged.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// History read errors
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History query for session {session_id} failed: {message}")]
    Query { session_id: String, message: String },

    #[error("History record for session {session_id} is missing required field '{field}'")]
    MalformedRecord { session_id: String, field: String },

    #[error("History source unavailable: {message}")]
    Unavailable { message: String },
}

impl HistoryError {
    pub fn query(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    pub fn malformed_record(session_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MalformedRecord {
            session_id: session_id.into(),
            field: field.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Source of recent session requests
#[async_trait]
pub trait HistorySource: Send + Sync + 'static {
    /// Requests recorded for `session_id` within the trailing `window`,
    /// oldest first, with normalized paths
    async fn fetch_session_requests(
        &self,
        session_id: &str,
        window: Duration,
    ) -> Result<Vec<SessionRequestEvent>, HistoryError>;

    /// Source name for logging
    fn source_name(&self) -> &'static str;
}
