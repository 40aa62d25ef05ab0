use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::config::loader::mask_url_password;
use crate::config::DatabaseConnectionConfig;

/// Open a pool for one collaborator and verify it answers
pub async fn connect(name: &str, config: &DatabaseConnectionConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.url)
        .await?;

    health_check(&pool).await?;

    info!(
        connection = name,
        url = %mask_url_password(&config.url),
        max_connections = config.max_connections,
        "Database connection established"
    );

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 as health").fetch_one(pool).await?;
    let health: i32 = row.get("health");
    Ok(health == 1)
}
