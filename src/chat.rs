//! Retrieval + memory core: the conversational RAG turn.
//!
//! A chat turn moves through a fixed sequence: get-or-create the session,
//! load the bounded history, persist the user message while embedding the
//! query, run vault-scoped retrieval, compose the prompt, call the chat
//! model, persist the reply.
//!
//! The user message is persisted before any provider call succeeds, so a
//! failed embedding or completion leaves durable intent: the session
//! history shows the question, and a retried turn starts a fresh call
//! rather than producing a duplicate assistant message.
//!
//! Two concurrent turns on the same session are serialized by a
//! session-keyed mutex, guaranteeing each turn's user message strictly
//! precedes its assistant message in the log.

use dashmap::DashMap;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::ChatConfig;
use crate::error::ApiError;
use crate::models::{ChatMessage, Message, MessageRole, Source};
use crate::provider::{ChatCompleter, Embedder};
use crate::retry::Deadline;
use crate::sessions;
use crate::vector_store::{SearchHit, VectorStore};

/// Instruction used when no agent supplies its own system prompt.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's question \
using the provided context when it is relevant. If the context does not contain the answer, \
say so rather than guessing.";

/// Character budget for retrieved context in the prompt (roughly 3000
/// tokens at 4 chars per token, matching the chat model's memory budget).
const CONTEXT_CHAR_BUDGET: usize = 12_000;

/// Per-session write locks.
///
/// Lock entries are created on first use and kept for the life of the
/// process; a session's lock must be stable across turns for the ordering
/// guarantee to hold.
#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Per-turn knobs resolved by the HTTP boundary.
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub vault_id: Option<String>,
    pub top_k: usize,
    pub temperature: f32,
    /// Agent-supplied system prompt; falls back to the default instruction.
    pub system_prompt: Option<String>,
}

/// Result of a completed chat turn.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub answer: String,
    pub sources: Vec<Source>,
}

/// Execute one conversational RAG turn for the session.
#[allow(clippy::too_many_arguments)]
pub async fn chat_turn(
    pool: &SqlitePool,
    store: &VectorStore,
    embedder: &dyn Embedder,
    completer: &dyn ChatCompleter,
    locks: &SessionLocks,
    config: &ChatConfig,
    session_id: &str,
    user_id: Option<&str>,
    message: &str,
    params: ChatParams,
    deadline: Deadline,
) -> Result<ChatOutcome, ApiError> {
    if message.trim().is_empty() {
        return Err(ApiError::Validation("message must not be empty".to_string()));
    }

    let lock = locks.lock_for(session_id);
    let _guard = lock.lock().await;

    sessions::get_or_create(pool, session_id, user_id).await?;

    // History is loaded before the new user message is persisted, so the
    // prompt carries at most max_history_messages prior turns plus the
    // current message appended explicitly below.
    let history = sessions::recent_messages(pool, session_id, config.max_history_messages).await?;

    // Durable intent: the user message is persisted regardless of whether
    // the query embedding succeeds. Both must finish before retrieval.
    let message_batch = [message.to_string()];
    let (persisted, embedded) = tokio::join!(
        sessions::append_message(pool, session_id, MessageRole::User, message),
        embedder.embed(&message_batch, deadline),
    );
    persisted?;
    let query_vector = embedded?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal("embedder returned no vector for query".to_string()))?;

    let hits = store
        .search(&query_vector, params.top_k, params.vault_id.as_deref())
        .await?;

    let system_prompt = params
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let messages = compose_messages(system_prompt, &hits, &history, message, CONTEXT_CHAR_BUDGET);

    tracing::info!(
        %session_id,
        vault_id = params.vault_id.as_deref().unwrap_or("-"),
        history_len = history.len(),
        retrieved = hits.len(),
        "generating chat reply"
    );

    let answer = completer
        .complete(&messages, params.temperature, deadline)
        .await?;

    sessions::append_message(pool, session_id, MessageRole::Assistant, &answer).await?;
    sessions::update_last_active(pool, session_id).await?;

    let sources = hits
        .into_iter()
        .map(|hit| Source {
            document_id: hit.document_id,
            title: hit.title,
            snippet: hit.snippet,
            score: hit.score,
        })
        .collect();

    Ok(ChatOutcome { answer, sources })
}

/// Assemble the provider message sequence for a turn.
///
/// The system message carries the instruction plus a labeled context block
/// with retrieved chunks in score order. When the block exceeds
/// `budget_chars`, the lowest-scoring chunks are dropped first until it
/// fits. History follows in ascending time order, then the current user
/// message.
pub fn compose_messages(
    system_prompt: &str,
    hits: &[SearchHit],
    history: &[Message],
    user_message: &str,
    budget_chars: usize,
) -> Vec<ChatMessage> {
    // Hits arrive sorted by score descending; keep the prefix that fits.
    let mut kept = 0usize;
    let mut used = 0usize;
    for hit in hits {
        let cost = hit.text.chars().count();
        if used + cost > budget_chars && kept > 0 {
            break;
        }
        used += cost;
        kept += 1;
        if used >= budget_chars {
            break;
        }
    }

    let mut system = String::from(system_prompt);
    if kept > 0 {
        system.push_str("\n\nContext from the knowledge base:");
        for hit in &hits[..kept] {
            let label = match &hit.title {
                Some(title) => format!("{} ({})", title, hit.document_id),
                None => hit.document_id.clone(),
            };
            system.push_str(&format!("\n\n[{}]\n{}", label, hit.text));
        }
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new(MessageRole::System, system));
    for msg in history {
        messages.push(ChatMessage::new(msg.role, msg.content.clone()));
    }
    messages.push(ChatMessage::new(MessageRole::User, user_message));

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_ts;

    fn hit(doc: &str, score: f32, text: &str) -> SearchHit {
        SearchHit {
            chunk_id: format!("c-{doc}"),
            document_id: doc.to_string(),
            title: Some(format!("Title {doc}")),
            text: text.to_string(),
            snippet: text.to_string(),
            score,
            ordinal: 0,
        }
    }

    fn message(role: MessageRole, content: &str) -> Message {
        Message {
            id: 0,
            session_id: "s".to_string(),
            role,
            content: content.to_string(),
            created_at: now_ts(),
        }
    }

    #[test]
    fn system_message_carries_context_in_score_order() {
        let hits = vec![hit("d1", 0.9, "first"), hit("d2", 0.5, "second")];
        let messages = compose_messages("Be helpful.", &hits, &[], "question", 10_000);

        assert_eq!(messages[0].role, MessageRole::System);
        let system = &messages[0].content;
        assert!(system.starts_with("Be helpful."));
        let first_pos = system.find("first").unwrap();
        let second_pos = system.find("second").unwrap();
        assert!(first_pos < second_pos);
        assert!(system.contains("Title d1 (d1)"));
    }

    #[test]
    fn history_precedes_current_user_message() {
        let history = vec![
            message(MessageRole::User, "My name is Zoe."),
            message(MessageRole::Assistant, "Nice to meet you, Zoe."),
        ];
        let messages = compose_messages("sys", &[], &history, "What is my name?", 10_000);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "My name is Zoe.");
        assert_eq!(messages[2].role, MessageRole::Assistant);
        assert_eq!(messages[3].role, MessageRole::User);
        assert_eq!(messages[3].content, "What is my name?");
    }

    #[test]
    fn no_context_block_without_hits() {
        let messages = compose_messages("sys", &[], &[], "q", 10_000);
        assert_eq!(messages[0].content, "sys");
    }

    #[test]
    fn budget_drops_lowest_scoring_first() {
        let hits = vec![
            hit("d1", 0.9, &"a".repeat(50)),
            hit("d2", 0.7, &"b".repeat(50)),
            hit("d3", 0.2, &"c".repeat(50)),
        ];
        let messages = compose_messages("sys", &hits, &[], "q", 110);
        let system = &messages[0].content;
        assert!(system.contains(&"a".repeat(50)));
        assert!(system.contains(&"b".repeat(50)));
        assert!(!system.contains(&"c".repeat(50)));
    }

    #[test]
    fn at_least_one_chunk_survives_a_tiny_budget() {
        let hits = vec![hit("d1", 0.9, &"a".repeat(500))];
        let messages = compose_messages("sys", &hits, &[], "q", 10);
        assert!(messages[0].content.contains(&"a".repeat(500)));
    }
}
