//! Database query functions for the `profiles` table.
//!
//! Plan and credit columns are only ever changed by single conditional
//! UPDATE statements; nothing here reads a balance and writes it back.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Plan, Profile};

/// Balance reported by the storage layer when no credit could be taken.
pub const INSUFFICIENT_CREDITS: i32 = -1;

/// Outcome of [`decrement_credit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditDecrement {
    /// One credit was taken; this is the balance left afterwards.
    Remaining(i32),
    /// The balance was already zero (or the account does not exist).
    Insufficient,
}

impl CreditDecrement {
    /// The balance as an integer, using [`INSUFFICIENT_CREDITS`] as sentinel.
    pub fn balance(self) -> i32 {
        match self {
            Self::Remaining(n) => n,
            Self::Insufficient => INSUFFICIENT_CREDITS,
        }
    }

    /// Whether a generation may proceed. A balance of zero after the
    /// decrement blocks just like the sentinel does.
    pub fn permits_generation(self) -> bool {
        self.balance() > 0
    }
}

/// Create a trial account with `credits` credits and a trial lasting
/// `trial_days` days from now.
pub async fn insert_trial_profile(
    pool: &PgPool,
    email: &str,
    credits: i32,
    trial_days: i32,
) -> Result<Profile> {
    let profile = sqlx::query_as::<_, Profile>(
        "INSERT INTO profiles (email, plan, credits, trial_ends_at, last_credit_reset) \
         VALUES ($1, 'trial', $2, now() + make_interval(days => $3), now()) \
         RETURNING *",
    )
    .bind(email)
    .bind(credits)
    .bind(trial_days)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert profile for {email}"))?;

    Ok(profile)
}

/// Fetch a profile by ID.
pub async fn get_profile(pool: &PgPool, id: Uuid) -> Result<Option<Profile>> {
    let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch profile")?;

    Ok(profile)
}

/// Fetch a profile by email.
pub async fn get_profile_by_email(pool: &PgPool, email: &str) -> Result<Option<Profile>> {
    let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch profile for {email}"))?;

    Ok(profile)
}

/// Atomically take one credit from the account.
///
/// The `credits > 0` predicate lives in the UPDATE itself, so two
/// concurrent calls against a balance of 1 cannot both succeed.
pub async fn decrement_credit(pool: &PgPool, user_id: Uuid) -> Result<CreditDecrement> {
    let remaining: Option<i32> = sqlx::query_scalar(
        "UPDATE profiles \
         SET credits = credits - 1 \
         WHERE id = $1 AND credits > 0 \
         RETURNING credits",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to decrement credits for {user_id}"))?;

    Ok(match remaining {
        Some(n) => CreditDecrement::Remaining(n),
        None => CreditDecrement::Insufficient,
    })
}

/// Set plan and credits for the account with `email`, stamping
/// `last_credit_reset`. Returns the number of rows updated (0 when no
/// account has that email).
pub async fn apply_plan_grant(pool: &PgPool, email: &str, plan: Plan, credits: i32) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE profiles \
         SET plan = $1, credits = $2, last_credit_reset = now() \
         WHERE email = $3",
    )
    .bind(plan)
    .bind(credits)
    .bind(email)
    .execute(pool)
    .await
    .with_context(|| format!("failed to apply {plan} grant to {email}"))?;

    Ok(result.rows_affected())
}

/// Top trial and free accounts back up to `credits` when their last reset
/// is more than a day old. Returns the number of accounts reset.
pub async fn reset_daily_credits(pool: &PgPool, credits: i32) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE profiles \
         SET credits = $1, last_credit_reset = now() \
         WHERE plan IN ('trial', 'free') \
           AND (last_credit_reset IS NULL OR last_credit_reset < now() - interval '1 day')",
    )
    .bind(credits)
    .execute(pool)
    .await
    .context("failed to reset daily credits")?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_balance_blocks_like_the_sentinel() {
        assert!(CreditDecrement::Remaining(3).permits_generation());
        assert!(!CreditDecrement::Remaining(0).permits_generation());
        assert!(!CreditDecrement::Insufficient.permits_generation());
        assert_eq!(CreditDecrement::Insufficient.balance(), INSUFFICIENT_CREDITS);
    }
}
