//! Sessions and append-only message history.
//!
//! Session ids are chosen by the caller; `get_or_create` makes the first
//! chat turn on a new id transparent. `last_active_at` only moves forward.
//! Messages are append-only and ordered by `(created_at, id)` so two
//! writes in the same millisecond still order by insertion.

use sqlx::{Row, SqlitePool};

use crate::error::ApiError;
use crate::models::{now_ts, Message, MessageRole, Session};

pub async fn get_or_create(
    pool: &SqlitePool,
    session_id: &str,
    user_id: Option<&str>,
) -> Result<Session, ApiError> {
    if session_id.trim().is_empty() {
        return Err(ApiError::Validation(
            "session_id must not be empty".to_string(),
        ));
    }

    if let Some(row) = sqlx::query(
        "SELECT id, user_id, created_at, last_active_at FROM sessions WHERE id = ?",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?
    {
        return Ok(Session {
            id: row.get("id"),
            user_id: row.get("user_id"),
            created_at: row.get("created_at"),
            last_active_at: row.get("last_active_at"),
        });
    }

    let now = now_ts();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, created_at, last_active_at) VALUES (?, ?, ?, ?)",
    )
    .bind(session_id)
    .bind(user_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!(%session_id, "session created");
    Ok(Session {
        id: session_id.to_string(),
        user_id: user_id.map(|u| u.to_string()),
        created_at: now.clone(),
        last_active_at: now,
    })
}

/// Advance `last_active_at` to now. Monotonic: an older timestamp never
/// overwrites a newer one (MAX over RFC 3339 strings is chronological).
pub async fn update_last_active(pool: &SqlitePool, session_id: &str) -> Result<(), ApiError> {
    sqlx::query("UPDATE sessions SET last_active_at = MAX(last_active_at, ?) WHERE id = ?")
        .bind(now_ts())
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Append a message to the session's history.
pub async fn append_message(
    pool: &SqlitePool,
    session_id: &str,
    role: MessageRole,
    content: &str,
) -> Result<Message, ApiError> {
    let now = now_ts();
    let result = sqlx::query(
        "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(session_id)
    .bind(role.as_str())
    .bind(content)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(Message {
        id: result.last_insert_rowid(),
        session_id: session_id.to_string(),
        role,
        content: content.to_string(),
        created_at: now,
    })
}

/// The most recent `limit` messages, returned in ascending chronological
/// order (oldest first), ready to replay as chat context.
pub async fn recent_messages(
    pool: &SqlitePool,
    session_id: &str,
    limit: usize,
) -> Result<Vec<Message>, ApiError> {
    let rows = sqlx::query(
        "SELECT id, session_id, role, content, created_at FROM messages \
         WHERE session_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(session_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    let mut messages: Vec<Message> = rows
        .iter()
        .map(|row| {
            let role_str: String = row.get("role");
            Message {
                id: row.get("id"),
                session_id: row.get("session_id"),
                role: MessageRole::parse(&role_str).unwrap_or(MessageRole::User),
                content: row.get("content"),
                created_at: row.get("created_at"),
            }
        })
        .collect();
    messages.reverse();

    Ok(messages)
}
