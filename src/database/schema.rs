//! # Schema Bootstrap
//!
//! Idempotent DDL for the tables the profiler owns. The `session_requests`
//! history table belongs to the request recorder and is never created here.
//!
//! Each call runs in a transaction holding a PostgreSQL advisory lock so
//! several profiler instances starting together do not race on
//! `CREATE ... IF NOT EXISTS`.

use sqlx::PgPool;
use tracing::debug;

const SCHEMA_LOCK_KEY: i64 = 7_305_112_201_846_001;

const QUEUE_SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS profiler_queue_position_seq;

CREATE TABLE IF NOT EXISTS profiler_queue_items (
    id BIGSERIAL PRIMARY KEY,
    queue_name TEXT NOT NULL,
    payload TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'ready'
        CHECK (state IN ('ready', 'unacked', 'rejected')),
    position BIGINT NOT NULL DEFAULT nextval('profiler_queue_position_seq'),
    consumer_id TEXT,
    last_heartbeat TIMESTAMPTZ,
    delivery_count INTEGER NOT NULL DEFAULT 0,
    enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    rejected_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_profiler_queue_items_ready
    ON profiler_queue_items (queue_name, state, position);

CREATE INDEX IF NOT EXISTS idx_profiler_queue_items_heartbeat
    ON profiler_queue_items (queue_name, last_heartbeat)
    WHERE state = 'unacked';
"#;

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session_priorities (
    session_id TEXT PRIMARY KEY,
    priority TEXT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_session_priorities_expires_at
    ON session_priorities (expires_at);
"#;

const AUDIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session_priority_log (
    id BIGSERIAL PRIMARY KEY,
    session_id TEXT NOT NULL,
    priority TEXT NOT NULL,
    logged_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_priority_log_session
    ON session_priority_log (session_id, logged_at);
"#;

async fn apply(pool: &PgPool, name: &str, ddl: &str) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await?;
    sqlx::raw_sql(ddl).execute(&mut *tx).await?;
    tx.commit().await?;

    debug!(schema = name, "Schema ensured");
    Ok(())
}

pub async fn ensure_queue_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    apply(pool, "queue", QUEUE_SCHEMA).await
}

pub async fn ensure_store_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    apply(pool, "store", STORE_SCHEMA).await
}

pub async fn ensure_audit_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    apply(pool, "audit", AUDIT_SCHEMA).await
}
