//! Webhook reconciliation against a real database.

use serde_json::{Value, json};
use sqlx::PgPool;

use promptdeck_db::models::{Plan, Profile};
use promptdeck_db::queries::{profiles, webhook_events};
use promptdeck_test_utils::TestDb;

use promptdeck_core::billing::{
    DAILY_CREDITS, SignatureError, TRIAL_DAYS, WebhookConfig, WebhookError, WebhookOutcome,
    compute_signature, process_webhook,
};

const SECRET: &[u8] = b"whsec_integration";
const WEEKLY_VARIANT: &str = "4242";
const EMAIL: &str = "buyer@example.com";

fn config() -> WebhookConfig {
    WebhookConfig {
        secret: SECRET.to_vec(),
        weekly_variant_id: Some(WEEKLY_VARIANT.to_owned()),
    }
}

fn subscription(event: &str, status: &str, variant: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "meta": { "event_name": event },
        "data": {
            "type": "subscriptions",
            "attributes": { "user_email": EMAIL, "status": status, "variant_id": variant }
        }
    }))
    .unwrap()
}

async fn deliver(pool: &PgPool, body: &[u8]) -> Result<WebhookOutcome, WebhookError> {
    let sig = compute_signature(SECRET, body);
    process_webhook(pool, &config(), body, Some(&sig)).await
}

async fn account(pool: &PgPool) -> Profile {
    profiles::get_profile_by_email(pool, EMAIL)
        .await
        .unwrap()
        .expect("profile exists")
}

#[tokio::test]
async fn weekly_subscription_grants_weekly_plan() {
    let db = TestDb::create().await;
    let before = profiles::insert_trial_profile(&db.pool, EMAIL, DAILY_CREDITS, TRIAL_DAYS)
        .await
        .unwrap();

    let outcome = deliver(&db.pool, &subscription("subscription_created", "active", json!(4242)))
        .await
        .unwrap();
    assert_eq!(outcome.rows_updated, 1);

    let after = account(&db.pool).await;
    assert_eq!(after.plan, Plan::Weekly);
    assert_eq!(after.credits, 250);
    assert!(after.last_credit_reset >= before.last_credit_reset);

    let events = webhook_events::list_recent_events(&db.pool, 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "subscription_created");
    assert_eq!(events[0].payload["data"]["attributes"]["user_email"], EMAIL);

    db.teardown().await;
}

#[tokio::test]
async fn other_variant_grants_pro_and_cancellation_expires() {
    let db = TestDb::create().await;
    profiles::insert_trial_profile(&db.pool, EMAIL, DAILY_CREDITS, TRIAL_DAYS)
        .await
        .unwrap();

    deliver(&db.pool, &subscription("subscription_updated", "on_trial", json!(7)))
        .await
        .unwrap();
    let pro = account(&db.pool).await;
    assert_eq!((pro.plan, pro.credits), (Plan::Pro, 1000));

    deliver(&db.pool, &subscription("subscription_updated", "cancelled", json!(7)))
        .await
        .unwrap();
    let expired = account(&db.pool).await;
    assert_eq!((expired.plan, expired.credits), (Plan::Expired, 0));

    deliver(&db.pool, &subscription("subscription_payment_success", "active", json!(4242)))
        .await
        .unwrap();
    let renewed = account(&db.pool).await;
    assert_eq!((renewed.plan, renewed.credits), (Plan::Weekly, 250));

    assert_eq!(webhook_events::count_events(&db.pool).await.unwrap(), 3);
    db.teardown().await;
}

#[tokio::test]
async fn bad_signatures_change_nothing() {
    let db = TestDb::create().await;
    profiles::insert_trial_profile(&db.pool, EMAIL, DAILY_CREDITS, TRIAL_DAYS)
        .await
        .unwrap();
    let body = subscription("subscription_created", "active", json!(4242));
    let wrong = compute_signature(b"not-the-secret", &body);

    let cases: Vec<(&[u8], Option<&str>)> = vec![
        (body.as_slice(), None),
        (body.as_slice(), Some("zz-not-hex")),
        (body.as_slice(), Some(wrong.as_str())),
        (&b""[..], Some(wrong.as_str())),
    ];
    for (payload, sig) in cases {
        let err = process_webhook(&db.pool, &config(), payload, sig)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Signature(_)), "got {err:?}");
    }

    let err = process_webhook(&db.pool, &config(), &body, None).await.unwrap_err();
    assert!(matches!(err, WebhookError::Signature(SignatureError::Missing)));

    assert_eq!(webhook_events::count_events(&db.pool).await.unwrap(), 0);
    let untouched = account(&db.pool).await;
    assert_eq!((untouched.plan, untouched.credits), (Plan::Trial, DAILY_CREDITS));

    db.teardown().await;
}

#[tokio::test]
async fn unhandled_events_are_recorded_without_changes() {
    let db = TestDb::create().await;
    profiles::insert_trial_profile(&db.pool, EMAIL, DAILY_CREDITS, TRIAL_DAYS)
        .await
        .unwrap();

    let outcome = deliver(&db.pool, &subscription("order_created", "paid", json!(4242)))
        .await
        .unwrap();
    assert!(outcome.applied.is_none());

    let outcome = deliver(&db.pool, &subscription("subscription_updated", "past_due", json!(4242)))
        .await
        .unwrap();
    assert!(outcome.applied.is_none());

    let no_meta = serde_json::to_vec(&json!({ "hello": "world" })).unwrap();
    deliver(&db.pool, &no_meta).await.unwrap();

    let events = webhook_events::list_recent_events(&db.pool, 10).await.unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].event_type, "unknown");

    let untouched = account(&db.pool).await;
    assert_eq!((untouched.plan, untouched.credits), (Plan::Trial, DAILY_CREDITS));
    db.teardown().await;
}

#[tokio::test]
async fn unknown_email_updates_no_rows() {
    let db = TestDb::create().await;

    let outcome = deliver(&db.pool, &subscription("subscription_created", "active", json!(1)))
        .await
        .unwrap();
    assert!(outcome.applied.is_some());
    assert_eq!(outcome.rows_updated, 0);
    assert_eq!(webhook_events::count_events(&db.pool).await.unwrap(), 1);

    db.teardown().await;
}

#[tokio::test]
async fn signed_garbage_fails_after_the_signature_check() {
    let db = TestDb::create().await;

    // The signature is valid, so this is a processing failure rather than
    // a rejected delivery.
    let err = deliver(&db.pool, b"{not json").await.unwrap_err();
    assert!(matches!(err, WebhookError::MalformedPayload(_)));
    assert!(!matches!(err, WebhookError::Signature(_)));
    assert_eq!(webhook_events::count_events(&db.pool).await.unwrap(), 0);

    db.teardown().await;
}
