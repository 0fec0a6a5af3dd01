//! Connection pool, embedded migrations and the `db-init` bootstrap.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/promptdeck-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Tables the migrations create, in the order `db-init` reports them.
pub const APP_TABLES: [&str; 6] = [
    "clients",
    "personas",
    "profiles",
    "prompts",
    "responses",
    "webhook_events",
];

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

fn pool_options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

/// Create the process-wide connection pool.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    pool_options(config.max_connections)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database_url))
}

/// Run all pending embedded migrations against the pool.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;

    info!(migrations = MIGRATOR.iter().count(), "schema up to date");
    Ok(())
}

/// Create the configured database through the server's `postgres`
/// database if it is missing. Returns `true` when it was created.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let name = config
        .database_name()
        .context("could not determine database name from URL")?;
    // CREATE DATABASE takes no bind parameters.
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        anyhow::bail!("database name {name:?} may only use letters, digits and underscores");
    }

    let maintenance_url = config.maintenance_url();
    let maint = pool_options(1)
        .connect(&maintenance_url)
        .await
        .with_context(|| format!("failed to connect to maintenance database at {maintenance_url}"))?;
    let created = create_if_missing(&maint, name).await;
    maint.close().await;
    created
}

async fn create_if_missing(maint: &PgPool, name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(name)
        .fetch_one(maint)
        .await
        .context("failed to query pg_database")?;
    if exists {
        return Ok(false);
    }

    maint
        .execute(format!("CREATE DATABASE {name}").as_str())
        .await
        .with_context(|| format!("failed to create database {name}"))?;
    info!(db = name, "database created");
    Ok(true)
}

/// Row count of each of [`APP_TABLES`].
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let mut counts = Vec::with_capacity(APP_TABLES.len());
    for table in APP_TABLES {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table}"))?;
        counts.push((table.to_owned(), count));
    }
    Ok(counts)
}
