//! `promptdeck credits` commands.

use anyhow::Result;
use sqlx::PgPool;

use promptdeck_core::billing::DAILY_CREDITS;
use promptdeck_db::queries::profiles;

use crate::CreditsCommands;

pub async fn run_credits_command(command: CreditsCommands, pool: &PgPool) -> Result<()> {
    match command {
        CreditsCommands::ResetDaily => {
            let reset = profiles::reset_daily_credits(pool, DAILY_CREDITS).await?;
            tracing::info!(accounts = reset, credits = DAILY_CREDITS, "daily credit reset");
            println!("Reset {reset} account(s) to {DAILY_CREDITS} credits.");
        }
    }
    Ok(())
}
