//! Agent management: named system prompts bound to a vault.
//!
//! Agents parameterize chat turns: when a chat request names an agent, the
//! agent's system prompt replaces the default instruction and its vault
//! becomes the retrieval scope unless the request overrides it. `(name,
//! vault_id)` is unique; deleting a vault removes its agents.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{now_ts, Agent};
use crate::vaults;

pub async fn create_agent(
    pool: &SqlitePool,
    name: &str,
    vault_id: &str,
    system_prompt: &str,
) -> Result<Agent, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("agent name must not be empty".to_string()));
    }
    if system_prompt.trim().is_empty() {
        return Err(ApiError::Validation(
            "system_prompt must not be empty".to_string(),
        ));
    }
    if !vaults::vault_exists(pool, vault_id).await? {
        return Err(ApiError::not_found("vault", vault_id));
    }

    let existing: Option<String> =
        sqlx::query_scalar("SELECT agent_id FROM agents WHERE name = ? AND vault_id = ?")
            .bind(name)
            .bind(vault_id)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(format!(
            "agent '{name}' already exists in vault {vault_id}"
        )));
    }

    let agent = Agent {
        agent_id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        vault_id: vault_id.to_string(),
        system_prompt: system_prompt.to_string(),
        created_at: now_ts(),
    };

    sqlx::query(
        "INSERT INTO agents (agent_id, name, vault_id, system_prompt, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&agent.agent_id)
    .bind(&agent.name)
    .bind(&agent.vault_id)
    .bind(&agent.system_prompt)
    .bind(&agent.created_at)
    .execute(pool)
    .await?;

    tracing::info!(agent_id = %agent.agent_id, name = %agent.name, vault_id = %vault_id, "agent created");
    Ok(agent)
}

pub async fn list_agents(
    pool: &SqlitePool,
    vault_id: Option<&str>,
) -> Result<Vec<Agent>, ApiError> {
    let rows = match vault_id {
        Some(vault) => {
            sqlx::query(
                "SELECT agent_id, name, vault_id, system_prompt, created_at FROM agents \
                 WHERE vault_id = ? ORDER BY created_at DESC",
            )
            .bind(vault)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT agent_id, name, vault_id, system_prompt, created_at FROM agents \
                 ORDER BY created_at DESC",
            )
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.iter().map(row_to_agent).collect())
}

pub async fn get_agent(pool: &SqlitePool, agent_id: &str) -> Result<Agent, ApiError> {
    let row = sqlx::query(
        "SELECT agent_id, name, vault_id, system_prompt, created_at FROM agents \
         WHERE agent_id = ?",
    )
    .bind(agent_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("agent", agent_id))?;

    Ok(row_to_agent(&row))
}

pub async fn delete_agent(pool: &SqlitePool, agent_id: &str) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM agents WHERE agent_id = ?")
        .bind(agent_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("agent", agent_id));
    }

    tracing::info!(%agent_id, "agent deleted");
    Ok(())
}

fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Agent {
    Agent {
        agent_id: row.get("agent_id"),
        name: row.get("name"),
        vault_id: row.get("vault_id"),
        system_prompt: row.get("system_prompt"),
        created_at: row.get("created_at"),
    }
}
