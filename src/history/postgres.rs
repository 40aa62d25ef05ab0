//! # PostgreSQL History Source
//!
//! Reads session requests from the `session_requests` table populated by the
//! request recorder in front of the application. Rows are expected to carry
//! `session_id`, `method`, `path` and `requested_at`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{HistoryError, HistorySource, SessionRequestEvent};
use crate::constants::tables;

#[derive(Debug, sqlx::FromRow)]
struct SessionRequestRow {
    method: Option<String>,
    path: Option<String>,
    requested_at: DateTime<Utc>,
}

/// History source backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgHistorySource {
    pool: PgPool,
}

impl PgHistorySource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl HistorySource for PgHistorySource {
    #[instrument(skip(self), fields(window_secs = window.as_secs()))]
    async fn fetch_session_requests(
        &self,
        session_id: &str,
        window: Duration,
    ) -> Result<Vec<SessionRequestEvent>, HistoryError> {
        let query = format!(
            r#"
            SELECT method, path, requested_at
            FROM {table}
            WHERE session_id = $1
              AND requested_at >= now() - make_interval(secs => $2)
            ORDER BY requested_at ASC
            "#,
            table = tables::SESSION_REQUESTS
        );

        let rows = sqlx::query_as::<_, SessionRequestRow>(&query)
            .bind(session_id)
            .bind(window.as_secs_f64())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HistoryError::query(session_id, e.to_string()))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let method = row
                .method
                .ok_or_else(|| HistoryError::malformed_record(session_id, "method"))?;
            let path = row
                .path
                .ok_or_else(|| HistoryError::malformed_record(session_id, "path"))?;
            events.push(SessionRequestEvent::new(method, &path, row.requested_at));
        }

        debug!(
            session_id = %session_id,
            event_count = events.len(),
            "Fetched session history"
        );

        Ok(events)
    }

    fn source_name(&self) -> &'static str {
        "postgres"
    }
}
