//! # In-Memory History Source
//!
//! Process-local history for tests and local development. Supports failure
//! injection so callers can exercise the "history unreadable" path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use super::{HistoryError, HistorySource, SessionRequestEvent};

#[derive(Debug, Default)]
pub struct InMemoryHistorySource {
    sessions: RwLock<HashMap<String, Vec<SessionRequestEvent>>>,
    unavailable: AtomicBool,
    fetch_count: AtomicU64,
}

impl InMemoryHistorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request at the current time
    pub fn record(&self, session_id: &str, method: &str, path: &str) {
        self.record_at(session_id, method, path, Utc::now());
    }

    pub fn record_at(&self, session_id: &str, method: &str, path: &str, at: DateTime<Utc>) {
        let mut sessions = self.sessions.write();
        let events = sessions.entry(session_id.to_string()).or_default();
        events.push(SessionRequestEvent::new(method, path, at));
        events.sort_by_key(|e| e.timestamp);
    }

    /// Make every subsequent fetch fail until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HistorySource for InMemoryHistorySource {
    async fn fetch_session_requests(
        &self,
        session_id: &str,
        window: Duration,
    ) -> Result<Vec<SessionRequestEvent>, HistoryError> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(HistoryError::unavailable("in-memory history marked unavailable"));
        }

        let window = chrono::Duration::from_std(window)
            .map_err(|e| HistoryError::query(session_id, e.to_string()))?;
        let cutoff = Utc::now() - window;

        let sessions = self.sessions.read();
        Ok(sessions
            .get(session_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn source_name(&self) -> &'static str {
        "in_memory"
    }
}
