//! `promptdeck user` commands: create accounts and issue session tokens.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;

use promptdeck_core::billing::{DAILY_CREDITS, TRIAL_DAYS};
use promptdeck_core::session::{SessionConfig, generate_session_token};
use promptdeck_db::models::Profile;
use promptdeck_db::queries::profiles;

use crate::UserCommands;

pub async fn run_user_command(command: UserCommands, pool: &PgPool, session: &SessionConfig) -> Result<()> {
    match command {
        UserCommands::Add { email } => {
            let (profile, token) = add_user(pool, session, &email).await?;
            print_profile(&profile);
            println!();
            println!("Session token: {token}");
        }
        UserCommands::Show { email } => {
            let profile = find_user(pool, &email).await?;
            print_profile(&profile);
        }
        UserCommands::Token { email } => {
            let profile = find_user(pool, &email).await?;
            println!("{}", generate_session_token(session, profile.id));
        }
    }
    Ok(())
}

/// Create a trial account and a session token for it.
pub async fn add_user(pool: &PgPool, session: &SessionConfig, email: &str) -> Result<(Profile, String)> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        anyhow::bail!("invalid email address: {email:?}");
    }
    if profiles::get_profile_by_email(pool, email).await?.is_some() {
        anyhow::bail!("an account for {email} already exists");
    }

    let profile = profiles::insert_trial_profile(pool, email, DAILY_CREDITS, TRIAL_DAYS)
        .await
        .with_context(|| format!("failed to create account for {email}"))?;
    tracing::info!(user_id = %profile.id, email = %profile.email, "created trial account");

    let token = generate_session_token(session, profile.id);
    Ok((profile, token))
}

async fn find_user(pool: &PgPool, email: &str) -> Result<Profile> {
    profiles::get_profile_by_email(pool, email.trim())
        .await?
        .with_context(|| format!("no account for {email}"))
}

fn print_profile(profile: &Profile) {
    println!("Account: {} ({})", profile.email, profile.id);
    println!("Plan: {}", profile.plan);
    println!("Credits: {}", profile.credits);
    if let Some(trial_ends_at) = profile.trial_ends_at {
        let state = if profile.trial_expired_at(Utc::now()) {
            "expired"
        } else {
            "active"
        };
        println!(
            "Trial ends: {} ({state})",
            trial_ends_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(reset) = profile.last_credit_reset {
        println!("Last credit reset: {}", reset.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

#[cfg(test)]
mod tests {
    use promptdeck_core::session::validate_session_token;
    use promptdeck_db::models::Plan;
    use promptdeck_test_utils::TestDb;

    use super::*;

    fn session() -> SessionConfig {
        SessionConfig::new(vec![3u8; 32])
    }

    #[tokio::test]
    async fn add_user_creates_trial_and_valid_token() {
        let db = TestDb::create().await;

        let (profile, token) = add_user(&db.pool, &session(), " new@example.com ").await.unwrap();
        assert_eq!(profile.email, "new@example.com");
        assert_eq!(profile.plan, Plan::Trial);
        assert_eq!(profile.credits, DAILY_CREDITS);
        assert_eq!(validate_session_token(&session(), &token).unwrap(), profile.id);

        let found = find_user(&db.pool, "new@example.com").await.unwrap();
        assert_eq!(found.id, profile.id);

        db.teardown().await;
    }

    #[tokio::test]
    async fn add_user_rejects_duplicates_and_bad_emails() {
        let db = TestDb::create().await;

        add_user(&db.pool, &session(), "dup@example.com").await.unwrap();
        let err = add_user(&db.pool, &session(), "dup@example.com").await.unwrap_err();
        assert!(err.to_string().contains("already exists"), "{err}");

        let err = add_user(&db.pool, &session(), "not-an-email").await.unwrap_err();
        assert!(err.to_string().contains("invalid email"), "{err}");

        let err = find_user(&db.pool, "ghost@example.com").await.unwrap_err();
        assert!(err.to_string().contains("no account"), "{err}");

        db.teardown().await;
    }
}
