//! Core data models for the service.
//!
//! The entity graph is a forest:
//!
//! ```text
//! Vault ──▶ Document ──▶ Chunk ──▶ Embedding
//!   └─────▶ Agent
//! Session ──▶ Message
//! ```
//!
//! Documents with a null `vault_id` belong to no vault; searches scoped to a
//! vault never see them, and unscoped searches see only them. Chunks and
//! embeddings are persisted relations owned by [`crate::vector_store`] and
//! surface here only as [`Source`] references. Timestamps are RFC 3339 UTC
//! with millisecond resolution, stored as TEXT so that lexicographic order
//! matches chronological order.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Current time as an RFC 3339 UTC string with millisecond resolution.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Tenant-scoped namespace for documents and agents.
#[derive(Debug, Clone, Serialize)]
pub struct Vault {
    pub vault_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

/// Immutable ingested text unit, owned by at most one vault.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub vault_id: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

/// Conversation thread identified by a caller-chosen id.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: Option<String>,
    pub created_at: String,
    pub last_active_at: String,
}

/// Role of a persisted or in-flight chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Append-only message within a session.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
}

/// Named configuration (system prompt + vault binding) for chat turns.
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub agent_id: String,
    pub name: String,
    pub vault_id: String,
    pub system_prompt: String,
    pub created_at: String,
}

/// A retrieved chunk reference returned alongside a chat answer.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub document_id: String,
    pub title: Option<String>,
    pub snippet: String,
    pub score: f32,
}

/// One turn of a provider chat conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}
