//! Integration tests for the embedded migrations and pool helpers.

use sqlx::Row;

use promptdeck_db::pool;
use promptdeck_test_utils::TestDb;

/// Tables created by the initial migration.
const EXPECTED_TABLES: &[&str] = &[
    "clients",
    "personas",
    "profiles",
    "prompts",
    "responses",
    "webhook_events",
];

#[tokio::test]
async fn migrations_create_all_tables() {
    let db = TestDb::create().await;

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT tablename::text FROM pg_tables \
         WHERE schemaname = 'public' \
         ORDER BY tablename",
    )
    .fetch_all(&db.pool)
    .await
    .expect("should list tables");

    let user_tables: Vec<&str> = rows
        .iter()
        .map(|(name,)| name.as_str())
        .filter(|t| !t.starts_with("_sqlx"))
        .collect();

    assert_eq!(
        user_tables, EXPECTED_TABLES,
        "migration should create exactly the expected tables"
    );

    db.teardown().await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = TestDb::create().await;

    pool::run_migrations(&db.pool)
        .await
        .expect("second migration run should succeed");

    for table in EXPECTED_TABLES {
        let query = format!("SELECT COUNT(*) AS cnt FROM {table}");
        let row = sqlx::query(&query)
            .fetch_one(&db.pool)
            .await
            .unwrap_or_else(|e| panic!("failed to count {table}: {e}"));
        let count: i64 = row.get("cnt");
        assert_eq!(count, 0, "table {table} should be empty after migrations");
    }

    db.teardown().await;
}

#[tokio::test]
async fn table_counts_lists_user_tables() {
    let db = TestDb::create().await;

    let counts = pool::table_counts(&db.pool)
        .await
        .expect("table_counts should succeed");
    let names: Vec<&str> = counts.iter().map(|(name, _)| name.as_str()).collect();

    assert_eq!(names, EXPECTED_TABLES);
    assert_eq!(names, pool::APP_TABLES);
    assert!(counts.iter().all(|(_, n)| *n == 0));

    sqlx::query("INSERT INTO profiles (email, plan, credits) VALUES ('a@example.com', 'trial', 4)")
        .execute(&db.pool)
        .await
        .unwrap();
    let counts = pool::table_counts(&db.pool).await.unwrap();
    let profiles = counts.iter().find(|(name, _)| name == "profiles").unwrap();
    assert_eq!(profiles.1, 1);
    assert_eq!(counts.iter().map(|(_, n)| n).sum::<i64>(), 1);

    db.teardown().await;
}

#[tokio::test]
async fn existing_database_is_left_alone() {
    let db = TestDb::create().await;

    let created = pool::ensure_database_exists(&db.config().await)
        .await
        .expect("existing database should be found");
    assert!(!created);

    db.teardown().await;
}

#[tokio::test]
async fn credits_cannot_go_negative() {
    let db = TestDb::create().await;

    let result = sqlx::query(
        "INSERT INTO profiles (email, plan, credits) VALUES ('neg@example.com', 'trial', -1)",
    )
    .execute(&db.pool)
    .await;
    assert!(result.is_err(), "credits >= 0 check should reject -1");

    let result = sqlx::query(
        "INSERT INTO profiles (email, plan, credits) VALUES ('bad@example.com', 'gold', 1)",
    )
    .execute(&db.pool)
    .await;
    assert!(result.is_err(), "unknown plans should be rejected");

    db.teardown().await;
}
