//! PostgreSQL pool, migrations and the startup seed check

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String),

    #[error("Failed to run migrations: {0}")]
    MigrationError(String),

    #[error("Database is missing seed data: {0}")]
    MissingSeed(&'static str),

    #[error("Database health check failed: {0}")]
    HealthCheckError(String),
}

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await
        .map_err(|e| DbError::ConnectionError(e.to_string()))?;

    tracing::info!(max_connections, "Database connection pool created");
    Ok(pool)
}

/// Migrate, then make sure the rows every review depends on are present
pub async fn prepare(pool: &PgPool) -> Result<(), DbError> {
    run_migrations(pool).await?;
    verify_seed(pool).await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    tracing::info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DbError::MigrationError(e.to_string()))?;

    tracing::info!("Database migrations completed");
    Ok(())
}

/// The internal organization and the stage configuration are seeded by the
/// migrations; an operator deleting either breaks every review.
async fn verify_seed(pool: &PgPool) -> Result<(), DbError> {
    let (internal, stages): (i64, i64) = sqlx::query_as(
        "SELECT \
            (SELECT COUNT(*) FROM organizations WHERE organization_type = 'internal'), \
            (SELECT COUNT(*) FROM review_request_stages)",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| DbError::HealthCheckError(e.to_string()))?;

    if internal != 1 {
        return Err(DbError::MissingSeed("internal organization"));
    }
    if stages == 0 {
        return Err(DbError::MissingSeed("review stage configuration"));
    }

    tracing::info!(review_stages = stages, "Seed data verified");
    Ok(())
}

/// Connectivity probe for `/health`
pub async fn check_health(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| DbError::HealthCheckError(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_seed_names_the_rows() {
        let err = DbError::MissingSeed("internal organization");
        assert_eq!(
            err.to_string(),
            "Database is missing seed data: internal organization"
        );
    }
}
