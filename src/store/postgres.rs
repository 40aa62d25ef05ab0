//! PostgreSQL-backed priority store over the `session_priorities` table.

use async_trait::async_trait;
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{PriorityStore, StoreError};
use crate::constants::tables;
use crate::priority::Priority;

#[derive(Debug, Clone)]
pub struct PgPriorityStore {
    pool: PgPool,
    ttl: Duration,
}

impl PgPriorityStore {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

#[async_trait]
impl PriorityStore for PgPriorityStore {
    #[instrument(skip(self), fields(priority = %priority))]
    async fn set(&self, session_id: &str, priority: Priority) -> Result<(), StoreError> {
        let query = format!(
            r#"
            INSERT INTO {table} (session_id, priority, expires_at, updated_at)
            VALUES ($1, $2, now() + make_interval(secs => $3), now())
            ON CONFLICT (session_id) DO UPDATE
            SET priority = EXCLUDED.priority,
                expires_at = EXCLUDED.expires_at,
                updated_at = EXCLUDED.updated_at
            "#,
            table = tables::SESSION_PRIORITIES
        );

        sqlx::query(&query)
            .bind(session_id)
            .bind(priority.as_str())
            .bind(self.ttl.as_secs_f64())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::write(session_id, e.to_string()))?;

        debug!(session_id = %session_id, "Priority persisted");
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<Priority>, StoreError> {
        let query = format!(
            "SELECT priority FROM {table} WHERE session_id = $1 AND expires_at > now()",
            table = tables::SESSION_PRIORITIES
        );

        let value: Option<String> = sqlx::query_scalar(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::read(session_id, e.to_string()))?;

        value
            .map(|v| {
                Priority::from_str(&v).map_err(|_| StoreError::InvalidValue {
                    session_id: session_id.to_string(),
                    value: v,
                })
            })
            .transpose()
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let query = format!(
            "DELETE FROM {table} WHERE expires_at <= now()",
            table = tables::SESSION_PRIORITIES
        );

        let result = sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::purge(e.to_string()))?;

        Ok(result.rows_affected())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn store_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema;

    async fn test_store(ttl: Duration) -> Option<PgPriorityStore> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&database_url)
            .await
            .expect("Failed to connect to test database");
        schema::ensure_store_schema(&pool)
            .await
            .expect("Failed to create store schema");
        Some(PgPriorityStore::new(pool, ttl))
    }

    #[tokio::test]
    async fn test_set_overwrites_previous_priority() {
        let Some(store) = test_store(Duration::from_secs(60)).await else {
            println!("Skipping priority store test - no TEST_DATABASE_URL provided");
            return;
        };
        let session = format!("pg-store-{}", uuid::Uuid::new_v4());

        store.set(&session, Priority::Low).await.unwrap();
        store.set(&session, Priority::High).await.unwrap();

        assert_eq!(store.get(&session).await.unwrap(), Some(Priority::High));
    }

    #[tokio::test]
    async fn test_expired_priority_is_invisible_and_purged() {
        let Some(store) = test_store(Duration::from_millis(10)).await else {
            println!("Skipping priority store test - no TEST_DATABASE_URL provided");
            return;
        };
        let session = format!("pg-store-{}", uuid::Uuid::new_v4());

        store.set(&session, Priority::Unknown).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.get(&session).await.unwrap(), None);
        assert!(store.purge_expired().await.unwrap() >= 1);
    }
}
