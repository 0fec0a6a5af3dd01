//! Database query functions for the `responses` table and the
//! response-plus-prompt views built on it.

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{GeneratedResponse, InputVariables, SavedPrompt};
use crate::queries::prompts::{self, PromptUpdate};

const SAVED_PROMPT_SELECT: &str = "SELECT r.id, r.prompt_id, r.input_variables, r.ai_reply, r.created_at, \
            p.text AS prompt_text, p.category, p.sub_category, p.favorite \
     FROM responses r \
     JOIN prompts p ON p.id = r.prompt_id";

/// Insert a response row for `prompt_id`.
pub async fn insert_response(
    pool: &PgPool,
    prompt_id: Uuid,
    owner_id: Uuid,
    input_variables: &InputVariables,
    ai_reply: &str,
) -> Result<GeneratedResponse> {
    let response = sqlx::query_as::<_, GeneratedResponse>(
        "INSERT INTO responses (prompt_id, owner_id, input_variables, ai_reply) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(prompt_id)
    .bind(owner_id)
    .bind(Json(input_variables))
    .bind(ai_reply)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert response for prompt {prompt_id}"))?;

    Ok(response)
}

/// Fetch one of the caller's responses joined with its prompt.
pub async fn get_saved_prompt(pool: &PgPool, id: Uuid, owner_id: Uuid) -> Result<Option<SavedPrompt>> {
    let query = format!("{SAVED_PROMPT_SELECT} WHERE r.id = $1 AND r.owner_id = $2");
    let saved = sqlx::query_as::<_, SavedPrompt>(&query)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch response {id}"))?;

    Ok(saved)
}

/// List the caller's responses with their prompts, newest first.
pub async fn list_saved_prompts(pool: &PgPool, owner_id: Uuid) -> Result<Vec<SavedPrompt>> {
    let query = format!("{SAVED_PROMPT_SELECT} WHERE r.owner_id = $1 ORDER BY r.created_at DESC");
    let saved = sqlx::query_as::<_, SavedPrompt>(&query)
        .bind(owner_id)
        .fetch_all(pool)
        .await
        .context("failed to list responses")?;

    Ok(saved)
}

/// Replace the stored AI reply. Returns the number of rows updated.
pub async fn update_reply(pool: &PgPool, id: Uuid, owner_id: Uuid, ai_reply: &str) -> Result<u64> {
    let result = sqlx::query("UPDATE responses SET ai_reply = $1 WHERE id = $2 AND owner_id = $3")
        .bind(ai_reply)
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to update reply for response {id}"))?;

    Ok(result.rows_affected())
}

/// Result of [`update_saved_prompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedPromptEdit {
    Updated,
    /// No response with that id belongs to the caller.
    NotFound,
    /// Prompt fields were given but the prompt is a shared template.
    /// Nothing was written.
    SharedPrompt,
}

/// Edit a saved prompt: prompt fields go to the owning `prompts` row, the
/// reply to the `responses` row. Both run in one transaction.
pub async fn update_saved_prompt(
    pool: &PgPool,
    id: Uuid,
    owner_id: Uuid,
    prompt_update: &PromptUpdate,
    ai_reply: Option<&str>,
) -> Result<SavedPromptEdit> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let prompt_id: Option<Uuid> =
        sqlx::query_scalar("SELECT prompt_id FROM responses WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await
            .with_context(|| format!("failed to look up prompt for response {id}"))?;

    let Some(prompt_id) = prompt_id else {
        return Ok(SavedPromptEdit::NotFound);
    };

    if !prompt_update.is_empty()
        && prompts::update_prompt(&mut *tx, prompt_id, owner_id, prompt_update).await? == 0
    {
        tx.rollback().await.context("failed to roll back saved prompt update")?;
        return Ok(SavedPromptEdit::SharedPrompt);
    }

    if let Some(reply) = ai_reply {
        sqlx::query("UPDATE responses SET ai_reply = $1 WHERE id = $2 AND owner_id = $3")
            .bind(reply)
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to update reply for response {id}"))?;
    }

    tx.commit().await.context("failed to commit saved prompt update")?;
    Ok(SavedPromptEdit::Updated)
}

/// Set the bookmark on the prompt behind one of the caller's responses.
pub async fn set_favorite(pool: &PgPool, id: Uuid, owner_id: Uuid, favorite: bool) -> Result<bool> {
    let prompt_id: Option<Uuid> =
        sqlx::query_scalar("SELECT prompt_id FROM responses WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
            .with_context(|| format!("failed to look up prompt for response {id}"))?;

    match prompt_id {
        Some(prompt_id) => Ok(prompts::set_favorite(pool, prompt_id, owner_id, favorite).await? > 0),
        None => Ok(false),
    }
}

/// Delete a response and then its prompt, if the prompt is the caller's
/// own. Shared templates are left in place.
///
/// Returns `false` when the response does not exist or is not the caller's.
pub async fn delete_saved_prompt(pool: &PgPool, id: Uuid, owner_id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let prompt_id: Option<Uuid> = sqlx::query_scalar(
        "DELETE FROM responses WHERE id = $1 AND owner_id = $2 RETURNING prompt_id",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(&mut *tx)
    .await
    .with_context(|| format!("failed to delete response {id}"))?;

    let Some(prompt_id) = prompt_id else {
        return Ok(false);
    };

    sqlx::query("DELETE FROM prompts WHERE id = $1 AND owner_id = $2")
        .bind(prompt_id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to delete prompt {prompt_id}"))?;

    tx.commit().await.context("failed to commit delete")?;
    Ok(true)
}
