//! `promptdeck events` command: show the most recent webhook deliveries.

use anyhow::Result;
use sqlx::PgPool;

use promptdeck_core::billing::SubscriptionEvent;
use promptdeck_db::models::WebhookEvent;
use promptdeck_db::queries::webhook_events;

pub async fn run_events(pool: &PgPool, limit: i64) -> Result<()> {
    let total = webhook_events::count_events(pool).await?;
    let events = webhook_events::list_recent_events(pool, limit.max(1)).await?;

    if events.is_empty() {
        println!("No webhook events recorded.");
        return Ok(());
    }

    println!("Showing {} of {total} webhook event(s), newest first:", events.len());
    println!();
    println!(
        "{:<8} {:<20} {:<28} {:<32} {:<10}",
        "ID", "RECEIVED", "EVENT", "EMAIL", "STATUS"
    );
    for event in &events {
        println!("{}", format_event_row(event));
    }
    Ok(())
}

fn format_event_row(event: &WebhookEvent) -> String {
    let parsed = SubscriptionEvent::from_payload(&event.payload);
    format!(
        "{:<8} {:<20} {:<28} {:<32} {:<10}",
        event.id,
        event.received_at.format("%Y-%m-%d %H:%M:%S"),
        event.event_type,
        parsed.email.as_deref().unwrap_or("-"),
        parsed.status.as_deref().unwrap_or("-"),
    )
}
