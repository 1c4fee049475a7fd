//! Vault management: create, list, get, and cascade deletion.
//!
//! Vault names are unique across live vaults (checked case-insensitively,
//! the way most callers expect "Research" and "research" to collide).
//! Deletion proceeds leaves-first — embeddings and chunks via the vector
//! store, then document rows, then agents, then the vault row — and every
//! step is idempotent, so a delete interrupted by a crash converges to
//! fully-deleted when retried.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{now_ts, Vault};
use crate::vector_store::VectorStore;

/// A vault together with its live document count.
#[derive(Debug, Clone)]
pub struct VaultWithCount {
    pub vault: Vault,
    pub document_count: i64,
}

pub async fn create_vault(
    pool: &SqlitePool,
    name: &str,
    description: Option<&str>,
) -> Result<Vault, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("vault name must not be empty".to_string()));
    }

    let existing: Option<String> =
        sqlx::query_scalar("SELECT vault_id FROM vaults WHERE LOWER(name) = LOWER(?)")
            .bind(name)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(format!(
            "vault with name '{name}' already exists"
        )));
    }

    let vault = Vault {
        vault_id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: description.map(|d| d.to_string()),
        created_at: now_ts(),
    };

    sqlx::query(
        "INSERT INTO vaults (vault_id, name, description, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&vault.vault_id)
    .bind(&vault.name)
    .bind(&vault.description)
    .bind(&vault.created_at)
    .execute(pool)
    .await?;

    tracing::info!(vault_id = %vault.vault_id, name = %vault.name, "vault created");
    Ok(vault)
}

pub async fn list_vaults(pool: &SqlitePool) -> Result<Vec<VaultWithCount>, ApiError> {
    let rows = sqlx::query(
        "SELECT v.vault_id, v.name, v.description, v.created_at, \
                (SELECT COUNT(*) FROM documents d WHERE d.vault_id = v.vault_id) AS document_count \
         FROM vaults v ORDER BY v.created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| VaultWithCount {
            vault: Vault {
                vault_id: row.get("vault_id"),
                name: row.get("name"),
                description: row.get("description"),
                created_at: row.get("created_at"),
            },
            document_count: row.get("document_count"),
        })
        .collect())
}

pub async fn get_vault(pool: &SqlitePool, vault_id: &str) -> Result<VaultWithCount, ApiError> {
    let row = sqlx::query(
        "SELECT v.vault_id, v.name, v.description, v.created_at, \
                (SELECT COUNT(*) FROM documents d WHERE d.vault_id = v.vault_id) AS document_count \
         FROM vaults v WHERE v.vault_id = ?",
    )
    .bind(vault_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("vault", vault_id))?;

    Ok(VaultWithCount {
        vault: Vault {
            vault_id: row.get("vault_id"),
            name: row.get("name"),
            description: row.get("description"),
            created_at: row.get("created_at"),
        },
        document_count: row.get("document_count"),
    })
}

pub async fn vault_exists(pool: &SqlitePool, vault_id: &str) -> Result<bool, ApiError> {
    let found: Option<String> = sqlx::query_scalar("SELECT vault_id FROM vaults WHERE vault_id = ?")
        .bind(vault_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Delete a vault and everything it owns.
///
/// Order matters: embeddings/chunks first so no search can observe an
/// embedding whose vault row is gone, then documents, agents, and finally
/// the vault itself.
pub async fn delete_vault(
    pool: &SqlitePool,
    store: &VectorStore,
    vault_id: &str,
) -> Result<(), ApiError> {
    if !vault_exists(pool, vault_id).await? {
        return Err(ApiError::not_found("vault", vault_id));
    }

    store.delete_by_vault(vault_id).await?;

    sqlx::query("DELETE FROM documents WHERE vault_id = ?")
        .bind(vault_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM agents WHERE vault_id = ?")
        .bind(vault_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM vaults WHERE vault_id = ?")
        .bind(vault_id)
        .execute(pool)
        .await?;

    tracing::info!(%vault_id, "vault deleted");
    Ok(())
}
