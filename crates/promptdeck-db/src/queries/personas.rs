//! Database query functions for the `personas` table.
//!
//! The built-in default persona is not stored here.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Persona;

pub async fn insert_persona(
    pool: &PgPool,
    owner_id: Uuid,
    name: &str,
    instructions: &str,
) -> Result<Persona> {
    let persona = sqlx::query_as::<_, Persona>(
        "INSERT INTO personas (owner_id, name, instructions) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(owner_id)
    .bind(name)
    .bind(instructions)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert persona {name:?}"))?;

    Ok(persona)
}

pub async fn get_persona(pool: &PgPool, id: Uuid, owner_id: Uuid) -> Result<Option<Persona>> {
    let persona = sqlx::query_as::<_, Persona>(
        "SELECT * FROM personas WHERE id = $1 AND owner_id = $2",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to fetch persona {id}"))?;

    Ok(persona)
}

/// List the caller's personas, oldest first.
pub async fn list_personas(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Persona>> {
    let personas = sqlx::query_as::<_, Persona>(
        "SELECT * FROM personas WHERE owner_id = $1 ORDER BY created_at ASC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .context("failed to list personas")?;

    Ok(personas)
}

pub async fn update_persona(
    pool: &PgPool,
    id: Uuid,
    owner_id: Uuid,
    name: &str,
    instructions: &str,
) -> Result<Option<Persona>> {
    let persona = sqlx::query_as::<_, Persona>(
        "UPDATE personas SET name = $1, instructions = $2 \
         WHERE id = $3 AND owner_id = $4 \
         RETURNING *",
    )
    .bind(name)
    .bind(instructions)
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to update persona {id}"))?;

    Ok(persona)
}

pub async fn delete_persona(pool: &PgPool, id: Uuid, owner_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM personas WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete persona {id}"))?;

    Ok(result.rows_affected())
}
