//! Database query functions for the append-only `webhook_events` table.
//!
//! Rows are only ever inserted.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::PgPool;

use crate::models::WebhookEvent;

/// Append a received webhook to the audit log.
pub async fn insert_webhook_event(
    pool: &PgPool,
    event_type: &str,
    payload: &Value,
) -> Result<WebhookEvent> {
    let event = sqlx::query_as::<_, WebhookEvent>(
        "INSERT INTO webhook_events (event_type, payload) \
         VALUES ($1, $2) \
         RETURNING *",
    )
    .bind(event_type)
    .bind(payload)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to record webhook event {event_type}"))?;

    Ok(event)
}

/// The most recent events, newest first.
pub async fn list_recent_events(pool: &PgPool, limit: i64) -> Result<Vec<WebhookEvent>> {
    let events = sqlx::query_as::<_, WebhookEvent>(
        "SELECT * FROM webhook_events ORDER BY id DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list webhook events")?;

    Ok(events)
}

/// Total number of recorded events.
pub async fn count_events(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events")
        .fetch_one(pool)
        .await
        .context("failed to count webhook events")?;

    Ok(count)
}
