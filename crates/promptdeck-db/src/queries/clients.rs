//! Database query functions for the `clients` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{ClientData, ClientProfile};

/// Insert a client profile owned by `owner_id`.
pub async fn insert_client(
    pool: &PgPool,
    owner_id: Uuid,
    name: &str,
    data: &ClientData,
) -> Result<ClientProfile> {
    let client = sqlx::query_as::<_, ClientProfile>(
        "INSERT INTO clients (owner_id, name, data) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(owner_id)
    .bind(name)
    .bind(Json(data))
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert client {name:?}"))?;

    Ok(client)
}

/// Fetch one of the caller's client profiles.
pub async fn get_client(pool: &PgPool, id: Uuid, owner_id: Uuid) -> Result<Option<ClientProfile>> {
    let client = sqlx::query_as::<_, ClientProfile>(
        "SELECT * FROM clients WHERE id = $1 AND owner_id = $2",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to fetch client {id}"))?;

    Ok(client)
}

/// List the caller's client profiles, newest first.
pub async fn list_clients(pool: &PgPool, owner_id: Uuid) -> Result<Vec<ClientProfile>> {
    let clients = sqlx::query_as::<_, ClientProfile>(
        "SELECT * FROM clients WHERE owner_id = $1 ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .context("failed to list clients")?;

    Ok(clients)
}

/// Replace name and data of one of the caller's client profiles.
pub async fn update_client(
    pool: &PgPool,
    id: Uuid,
    owner_id: Uuid,
    name: &str,
    data: &ClientData,
) -> Result<Option<ClientProfile>> {
    let client = sqlx::query_as::<_, ClientProfile>(
        "UPDATE clients SET name = $1, data = $2 \
         WHERE id = $3 AND owner_id = $4 \
         RETURNING *",
    )
    .bind(name)
    .bind(Json(data))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to update client {id}"))?;

    Ok(client)
}

/// Delete one of the caller's client profiles. Returns rows deleted.
pub async fn delete_client(pool: &PgPool, id: Uuid, owner_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM clients WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete client {id}"))?;

    Ok(result.rows_affected())
}
