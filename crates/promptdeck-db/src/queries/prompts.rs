//! Database query functions for the `prompts` table.
//!
//! Every read is scoped to the caller's own rows plus shared rows
//! (`owner_id IS NULL`); every write is scoped to the caller's own rows.

use anyhow::{Context, Result};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::PromptTemplate;

/// Fields for a new prompt row.
#[derive(Debug, Clone)]
pub struct NewPrompt<'a> {
    pub text: &'a str,
    pub category: &'a str,
    pub sub_category: Option<&'a str>,
}

/// Partial update of a prompt. `sub_category: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct PromptUpdate {
    pub text: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<Option<String>>,
}

impl PromptUpdate {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.category.is_none() && self.sub_category.is_none()
    }
}

/// Insert a prompt. `owner_id = None` creates a shared template.
pub async fn insert_prompt(
    pool: &PgPool,
    owner_id: Option<Uuid>,
    new: &NewPrompt<'_>,
) -> Result<PromptTemplate> {
    let prompt = sqlx::query_as::<_, PromptTemplate>(
        "INSERT INTO prompts (owner_id, text, category, sub_category) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(owner_id)
    .bind(new.text)
    .bind(new.category)
    .bind(new.sub_category)
    .fetch_one(pool)
    .await
    .context("failed to insert prompt")?;

    Ok(prompt)
}

/// Fetch a prompt the caller may read (own or shared).
pub async fn get_visible_prompt(
    pool: &PgPool,
    id: Uuid,
    owner_id: Uuid,
) -> Result<Option<PromptTemplate>> {
    let prompt = sqlx::query_as::<_, PromptTemplate>(
        "SELECT * FROM prompts \
         WHERE id = $1 AND (owner_id = $2 OR owner_id IS NULL)",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch prompt")?;

    Ok(prompt)
}

/// List prompts that carry placeholder braces, newest first, optionally
/// narrowed to one category (case-insensitive).
pub async fn list_templates(
    pool: &PgPool,
    owner_id: Uuid,
    category: Option<&str>,
) -> Result<Vec<PromptTemplate>> {
    let templates = sqlx::query_as::<_, PromptTemplate>(
        "SELECT * FROM prompts \
         WHERE (owner_id = $1 OR owner_id IS NULL) \
           AND (strpos(text, '{') > 0 OR strpos(text, '}') > 0) \
           AND ($2::text IS NULL OR lower(category) = lower($2)) \
         ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .bind(category)
    .fetch_all(pool)
    .await
    .context("failed to list templates")?;

    Ok(templates)
}

/// Apply a partial update to one of the caller's prompts. Returns the
/// number of rows updated.
pub async fn update_prompt<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    owner_id: Uuid,
    update: &PromptUpdate,
) -> Result<u64> {
    let (set_sub_category, sub_category) = match &update.sub_category {
        Some(value) => (true, value.as_deref()),
        None => (false, None),
    };

    let result = sqlx::query(
        "UPDATE prompts \
         SET text = COALESCE($1, text), \
             category = COALESCE($2, category), \
             sub_category = CASE WHEN $3 THEN $4 ELSE sub_category END \
         WHERE id = $5 AND owner_id = $6",
    )
    .bind(update.text.as_deref())
    .bind(update.category.as_deref())
    .bind(set_sub_category)
    .bind(sub_category)
    .bind(id)
    .bind(owner_id)
    .execute(executor)
    .await
    .with_context(|| format!("failed to update prompt {id}"))?;

    Ok(result.rows_affected())
}

/// Set the bookmark flag on one of the caller's prompts.
pub async fn set_favorite(pool: &PgPool, id: Uuid, owner_id: Uuid, favorite: bool) -> Result<u64> {
    let result = sqlx::query("UPDATE prompts SET favorite = $1 WHERE id = $2 AND owner_id = $3")
        .bind(favorite)
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to set favorite on prompt {id}"))?;

    Ok(result.rows_affected())
}
