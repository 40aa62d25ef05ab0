//! Batched inserts into the `session_priority_log` table.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{AuditError, AuditSink};
use crate::constants::tables;
use crate::profiling::ClassificationResult;

#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn write_batch(&self, records: &[ClassificationResult]) -> Result<(), AuditError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} (session_id, priority, logged_at) ",
            tables::SESSION_PRIORITY_LOG
        ));
        builder.push_values(records, |mut row, record| {
            row.push_bind(record.session_id.clone())
                .push_bind(record.priority.as_str())
                .push_bind(record.evaluated_at);
        });

        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| AuditError::write(records.len(), e.to_string()))?;

        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "postgres"
    }
}
