//! # PostgreSQL Work Queue
//!
//! Reliable queue over the [`tables::QUEUE_ITEMS`] table. Concurrent consumers
//! claim rows with `FOR UPDATE SKIP LOCKED`; each unacked row carries its
//! owner and last heartbeat. Reclaimed rows get a negative position so they
//! sort ahead of everything already waiting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, instrument};

use super::errors::QueueError;
use crate::constants::tables;
use super::traits::WorkQueue;
use super::types::{ConsumerId, DeliveryHandle, QueueStats, WorkItem};

#[derive(Debug, sqlx::FromRow)]
struct ClaimedRow {
    id: i64,
    payload: String,
    delivery_count: i32,
    enqueued_at: DateTime<Utc>,
    position: i64,
}

#[derive(Debug, Clone)]
pub struct PgWorkQueue {
    pool: PgPool,
    queue_name: String,
}

impl PgWorkQueue {
    pub fn new(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_id(handle: &DeliveryHandle) -> Result<i64, QueueError> {
        handle
            .as_i64()
            .ok_or_else(|| QueueError::not_found(handle.clone()))
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn publish(&self, session_id: &str) -> Result<DeliveryHandle, QueueError> {
        let query = format!(
            "INSERT INTO {table} (queue_name, payload) VALUES ($1, $2) RETURNING id",
            table = tables::QUEUE_ITEMS
        );

        let id: i64 = sqlx::query_scalar(&query)
            .bind(&self.queue_name)
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::publish(&self.queue_name, e.to_string()))?;

        Ok(DeliveryHandle::from(id))
    }

    #[instrument(skip(self), fields(queue = %self.queue_name))]
    async fn fetch(&self, consumer: &ConsumerId, max: usize) -> Result<Vec<WorkItem>, QueueError> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let query = format!(
            r#"
            UPDATE {table} AS q
            SET state = 'unacked',
                consumer_id = $2,
                last_heartbeat = now(),
                delivery_count = q.delivery_count + 1
            WHERE q.id IN (
                SELECT id FROM {table}
                WHERE queue_name = $1 AND state = 'ready'
                ORDER BY position ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING q.id, q.payload, q.delivery_count, q.enqueued_at, q.position
            "#,
            table = tables::QUEUE_ITEMS
        );

        let mut rows = sqlx::query_as::<_, ClaimedRow>(&query)
            .bind(&self.queue_name)
            .bind(consumer.as_str())
            .bind(max as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueueError::consume(&self.queue_name, e.to_string()))?;

        // RETURNING order is unspecified; restore queue order
        rows.sort_by_key(|row| row.position);

        if !rows.is_empty() {
            debug!(consumer = %consumer, count = rows.len(), "Claimed deliveries");
        }

        Ok(rows
            .into_iter()
            .map(|row| WorkItem {
                session_id: row.payload,
                handle: DeliveryHandle::from(row.id),
                delivery_count: u32::try_from(row.delivery_count).unwrap_or(0),
                enqueued_at: row.enqueued_at,
            })
            .collect())
    }

    async fn ack(&self, consumer: &ConsumerId, handle: &DeliveryHandle) -> Result<(), QueueError> {
        let id = Self::row_id(handle)?;
        let query = format!(
            r#"
            DELETE FROM {table}
            WHERE id = $1 AND queue_name = $2 AND state = 'unacked' AND consumer_id = $3
            "#,
            table = tables::QUEUE_ITEMS
        );

        let result = sqlx::query(&query)
            .bind(id)
            .bind(&self.queue_name)
            .bind(consumer.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::delivery(handle.clone(), "ack", e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::not_found(handle.clone()));
        }
        Ok(())
    }

    async fn reject(
        &self,
        consumer: &ConsumerId,
        handle: &DeliveryHandle,
    ) -> Result<(), QueueError> {
        let id = Self::row_id(handle)?;
        let query = format!(
            r#"
            UPDATE {table}
            SET state = 'rejected', consumer_id = NULL, last_heartbeat = NULL, rejected_at = now()
            WHERE id = $1 AND queue_name = $2 AND state = 'unacked' AND consumer_id = $3
            "#,
            table = tables::QUEUE_ITEMS
        );

        let result = sqlx::query(&query)
            .bind(id)
            .bind(&self.queue_name)
            .bind(consumer.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::delivery(handle.clone(), "reject", e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::not_found(handle.clone()));
        }
        Ok(())
    }

    async fn heartbeat(
        &self,
        consumer: &ConsumerId,
        handles: &[DeliveryHandle],
    ) -> Result<u64, QueueError> {
        let ids: Vec<i64> = handles.iter().filter_map(DeliveryHandle::as_i64).collect();

        let query = format!(
            r#"
            UPDATE {table}
            SET last_heartbeat = now()
            WHERE queue_name = $1 AND consumer_id = $2 AND state = 'unacked' AND id = ANY($3)
            "#,
            table = tables::QUEUE_ITEMS
        );

        let result = sqlx::query(&query)
            .bind(&self.queue_name)
            .bind(consumer.as_str())
            .bind(&ids)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::connection(e.to_string()))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(queue = %self.queue_name))]
    async fn reclaim_orphans(&self, liveness_window: Duration) -> Result<u64, QueueError> {
        let query = format!(
            r#"
            UPDATE {table}
            SET state = 'ready',
                consumer_id = NULL,
                last_heartbeat = NULL,
                position = -nextval('profiler_queue_position_seq')
            WHERE queue_name = $1
              AND state = 'unacked'
              AND (last_heartbeat IS NULL OR last_heartbeat < now() - make_interval(secs => $2))
            "#,
            table = tables::QUEUE_ITEMS
        );

        let result = sqlx::query(&query)
            .bind(&self.queue_name)
            .bind(liveness_window.as_secs_f64())
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::connection(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let query = format!(
            "SELECT state, count(*) FROM {table} WHERE queue_name = $1 GROUP BY state",
            table = tables::QUEUE_ITEMS
        );

        let rows: Vec<(String, i64)> = sqlx::query_as(&query)
            .bind(&self.queue_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueueError::connection(e.to_string()))?;

        let mut stats = QueueStats::new(&self.queue_name);
        for (state, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            match state.as_str() {
                "ready" => stats.ready = count,
                "unacked" => stats.unacked = count,
                "rejected" => stats.rejected = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    fn provider_name(&self) -> &'static str {
        "postgres"
    }
}
