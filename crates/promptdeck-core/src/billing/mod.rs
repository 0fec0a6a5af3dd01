//! Plan and credit reconciliation from payment webhooks.
//!
//! A webhook is handled in three steps: the signature gate, the append to
//! the `webhook_events` audit log, then the transition table applied by a
//! single UPDATE keyed by customer email. [`reconcile`] is the pure table;
//! [`process_webhook`] wires it to storage.

pub mod signature;

use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use promptdeck_db::models::Plan;
use promptdeck_db::queries::{profiles, webhook_events};

pub use signature::{SIGNATURE_HEADER, SignatureError, compute_signature, verify_signature};

/// Credits granted with the weekly plan.
pub const WEEKLY_CREDITS: i32 = 250;
/// Credits granted with the pro (monthly) plan.
pub const PRO_CREDITS: i32 = 1000;
/// Daily balance for trial and free accounts.
pub const DAILY_CREDITS: i32 = 4;
/// Length of the trial given to new accounts.
pub const TRIAL_DAYS: i32 = 7;

const UNKNOWN_EVENT: &str = "unknown";

/// Secrets and identifiers the reconciler needs.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub secret: Vec<u8>,
    /// Variant id that maps to the weekly plan. Every other variant is pro.
    pub weekly_variant_id: Option<String>,
}

/// Event names the reconciler acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    PaymentSucceeded,
    Other(String),
}

impl EventKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "subscription_created" => Self::SubscriptionCreated,
            "subscription_updated" => Self::SubscriptionUpdated,
            "subscription_payment_success" => Self::PaymentSucceeded,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// The fields of a subscription webhook that drive reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEvent {
    /// `meta.event_name`, as recorded in the audit log.
    pub event_name: Option<String>,
    pub kind: Option<EventKind>,
    pub email: Option<String>,
    pub status: Option<String>,
    pub variant_id: Option<String>,
}

impl SubscriptionEvent {
    /// Pull the relevant fields out of a webhook payload. Missing or
    /// mistyped fields become `None`.
    pub fn from_payload(payload: &Value) -> Self {
        let event_name = payload
            .pointer("/meta/event_name")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let kind = event_name
            .as_deref()
            .or_else(|| payload.get("type").and_then(Value::as_str))
            .map(EventKind::parse);
        let attributes = payload.pointer("/data/attributes");
        let attr_str = |key: &str| {
            attributes
                .and_then(|a| a.get(key))
                .and_then(Value::as_str)
                .map(str::to_owned)
        };
        let variant_id = attributes
            .and_then(|a| a.get("variant_id"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        Self {
            event_name,
            kind,
            email: attr_str("user_email"),
            status: attr_str("status"),
            variant_id,
        }
    }

    /// Name recorded in the audit log.
    pub fn audit_name(&self) -> &str {
        self.event_name.as_deref().unwrap_or(UNKNOWN_EVENT)
    }
}

/// A (plan, credits) pair written to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanGrant {
    pub plan: Plan,
    pub credits: i32,
}

impl PlanGrant {
    pub const WEEKLY: Self = Self {
        plan: Plan::Weekly,
        credits: WEEKLY_CREDITS,
    };
    pub const PRO: Self = Self {
        plan: Plan::Pro,
        credits: PRO_CREDITS,
    };
    pub const EXPIRED: Self = Self {
        plan: Plan::Expired,
        credits: 0,
    };
}

/// A grant and the account it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub email: String,
    pub grant: PlanGrant,
}

fn variant_grant(variant_id: Option<&str>, weekly_variant_id: Option<&str>) -> PlanGrant {
    match (variant_id, weekly_variant_id) {
        (Some(variant), Some(weekly)) if variant == weekly => PlanGrant::WEEKLY,
        _ => PlanGrant::PRO,
    }
}

/// The transition table. `None` means the event changes nothing.
pub fn reconcile(event: &SubscriptionEvent, weekly_variant_id: Option<&str>) -> Option<Reconciliation> {
    let email = event.email.as_deref().filter(|e| !e.is_empty())?;
    let variant = event.variant_id.as_deref();

    let grant = match event.kind.as_ref()? {
        EventKind::SubscriptionCreated | EventKind::SubscriptionUpdated => {
            match event.status.as_deref()? {
                "active" | "on_trial" => variant_grant(variant, weekly_variant_id),
                "cancelled" | "expired" | "unpaid" => PlanGrant::EXPIRED,
                _ => return None,
            }
        }
        EventKind::PaymentSucceeded => variant_grant(variant, weekly_variant_id),
        EventKind::Other(_) => return None,
    };

    Some(Reconciliation {
        email: email.to_owned(),
        grant,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("webhook storage error: {0:#}")]
    Storage(anyhow::Error),
}

/// What a verified webhook did.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    /// Audit-log row id.
    pub event_id: i64,
    pub applied: Option<Reconciliation>,
    /// Accounts updated by the grant (0 when no account has the email).
    pub rows_updated: u64,
}

/// Verify, record, and apply one webhook delivery.
///
/// Nothing is written unless the signature checks out. A verified event is
/// always recorded, even when it maps to no transition.
pub async fn process_webhook(
    pool: &PgPool,
    config: &WebhookConfig,
    body: &[u8],
    signature_header: Option<&str>,
) -> Result<WebhookOutcome, WebhookError> {
    if let Err(e) = verify_signature(&config.secret, body, signature_header) {
        warn!(error = %e, "rejected webhook");
        return Err(e.into());
    }

    let payload: Value = serde_json::from_slice(body)?;
    let event = SubscriptionEvent::from_payload(&payload);

    let recorded = webhook_events::insert_webhook_event(pool, event.audit_name(), &payload)
        .await
        .map_err(WebhookError::Storage)?;

    let Some(reconciliation) = reconcile(&event, config.weekly_variant_id.as_deref()) else {
        debug!(
            event = event.audit_name(),
            status = ?event.status,
            "webhook requires no plan change"
        );
        return Ok(WebhookOutcome {
            event_id: recorded.id,
            applied: None,
            rows_updated: 0,
        });
    };

    let rows_updated = profiles::apply_plan_grant(
        pool,
        &reconciliation.email,
        reconciliation.grant.plan,
        reconciliation.grant.credits,
    )
    .await
    .map_err(WebhookError::Storage)?;

    if rows_updated == 0 {
        warn!(
            email = %reconciliation.email,
            event = event.audit_name(),
            "no account for webhook email"
        );
    } else {
        info!(
            email = %reconciliation.email,
            event = event.audit_name(),
            plan = %reconciliation.grant.plan,
            credits = reconciliation.grant.credits,
            "applied plan grant"
        );
    }

    Ok(WebhookOutcome {
        event_id: recorded.id,
        applied: Some(reconciliation),
        rows_updated,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const WEEKLY: &str = "111";

    fn event(name: &str, status: Option<&str>, variant: Value) -> SubscriptionEvent {
        let mut attributes = json!({ "user_email": "a@example.com", "variant_id": variant });
        if let Some(status) = status {
            attributes["status"] = json!(status);
        }
        SubscriptionEvent::from_payload(&json!({
            "meta": { "event_name": name },
            "data": { "attributes": attributes }
        }))
    }

    fn grant(e: &SubscriptionEvent) -> Option<PlanGrant> {
        reconcile(e, Some(WEEKLY)).map(|r| r.grant)
    }

    #[test]
    fn active_weekly_variant_grants_weekly() {
        let e = event("subscription_created", Some("active"), json!(111));
        assert_eq!(grant(&e), Some(PlanGrant::WEEKLY));
        assert_eq!(grant(&e).unwrap().credits, 250);
    }

    #[test]
    fn variant_id_may_be_a_string() {
        let e = event("subscription_updated", Some("on_trial"), json!("111"));
        assert_eq!(grant(&e), Some(PlanGrant::WEEKLY));
    }

    #[test]
    fn any_other_variant_grants_pro() {
        let e = event("subscription_updated", Some("active"), json!(999));
        assert_eq!(grant(&e), Some(PlanGrant::PRO));
        let e = event("subscription_created", Some("active"), Value::Null);
        assert_eq!(grant(&e), Some(PlanGrant::PRO));
    }

    #[test]
    fn without_weekly_config_everything_is_pro() {
        let e = event("subscription_created", Some("active"), json!(111));
        assert_eq!(reconcile(&e, None).unwrap().grant, PlanGrant::PRO);
    }

    #[test]
    fn terminal_statuses_expire() {
        for status in ["cancelled", "expired", "unpaid"] {
            let e = event("subscription_updated", Some(status), json!(111));
            assert_eq!(grant(&e), Some(PlanGrant::EXPIRED), "status {status}");
        }
    }

    #[test]
    fn other_statuses_are_noops() {
        for status in ["past_due", "paused", ""] {
            let e = event("subscription_updated", Some(status), json!(111));
            assert_eq!(grant(&e), None, "status {status}");
        }
        let e = event("subscription_created", None, json!(111));
        assert_eq!(grant(&e), None);
    }

    #[test]
    fn payment_success_follows_variant_regardless_of_status() {
        let e = event("subscription_payment_success", Some("past_due"), json!(111));
        assert_eq!(grant(&e), Some(PlanGrant::WEEKLY));
        let e = event("subscription_payment_success", None, json!(5));
        assert_eq!(grant(&e), Some(PlanGrant::PRO));
    }

    #[test]
    fn unknown_event_is_noop() {
        let e = event("order_created", Some("active"), json!(111));
        assert_eq!(grant(&e), None);
        assert_eq!(e.audit_name(), "order_created");
    }

    #[test]
    fn missing_email_is_noop() {
        let e = SubscriptionEvent::from_payload(&json!({
            "meta": { "event_name": "subscription_created" },
            "data": { "attributes": { "status": "active" } }
        }));
        assert_eq!(reconcile(&e, Some(WEEKLY)), None);
    }

    #[test]
    fn top_level_type_is_used_without_meta() {
        let e = SubscriptionEvent::from_payload(&json!({
            "type": "subscription_created",
            "data": { "attributes": { "user_email": "a@example.com", "status": "cancelled" } }
        }));
        assert_eq!(e.audit_name(), "unknown");
        assert_eq!(e.kind, Some(EventKind::SubscriptionCreated));
        assert_eq!(grant(&e), Some(PlanGrant::EXPIRED));
    }
}
