//! Ingestion pipeline orchestration.
//!
//! Coordinates the write path: validate → allocate document id → chunk →
//! embed (batched, with retry inside the adapter) → persist the document
//! row and the chunk vectors.
//!
//! # Atomicity
//!
//! Persistence is two coordinated writes: (a) the document row, then
//! (b) the vector store upsert, which is itself a single transaction. If
//! (b) fails after (a), the document row is removed as compensation, so a
//! reader observes either the complete document or nothing.
//!
//! Concurrent ingests into the same vault do not serialize, and an ingest
//! never blocks readers.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::chunker::chunk_text;
use crate::config::ChunkingConfig;
use crate::documents;
use crate::error::ApiError;
use crate::provider::Embedder;
use crate::retry::Deadline;
use crate::vaults;
use crate::vector_store::{ChunkUpsert, DenormMetadata, VectorStore};

/// Parameters of a single ingest operation.
#[derive(Debug, Clone)]
pub struct IngestInput {
    pub text: String,
    pub title: Option<String>,
    pub source: Option<String>,
    pub vault_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Run the full ingestion pipeline. Returns the new document id.
pub async fn ingest(
    pool: &SqlitePool,
    store: &VectorStore,
    embedder: &dyn Embedder,
    chunking: &ChunkingConfig,
    input: IngestInput,
    deadline: Deadline,
) -> Result<String, ApiError> {
    if input.text.trim().is_empty() {
        return Err(ApiError::Validation(
            "document text must not be empty".to_string(),
        ));
    }

    if let Some(ref vault_id) = input.vault_id {
        if !vaults::vault_exists(pool, vault_id).await? {
            return Err(ApiError::not_found("vault", vault_id.clone()));
        }
    }

    let document_id = Uuid::new_v4().to_string();

    let chunks = chunk_text(&input.text, chunking.window_tokens, chunking.overlap_tokens);
    if chunks.is_empty() {
        return Err(ApiError::Validation(
            "document text produced no chunks".to_string(),
        ));
    }

    tracing::info!(
        %document_id,
        vault_id = input.vault_id.as_deref().unwrap_or("-"),
        chunk_count = chunks.len(),
        "ingesting document"
    );

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed(&texts, deadline).await?;

    let upserts: Vec<ChunkUpsert> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| ChunkUpsert {
            ordinal: chunk.ordinal,
            text: chunk.text,
            token_count: chunk.token_count,
            vector,
        })
        .collect();

    let doc = documents::new_document(
        document_id.clone(),
        input.vault_id.clone(),
        input.title.clone(),
        input.source.clone(),
        input.metadata,
    );
    documents::insert_document(pool, &doc).await?;

    let meta = DenormMetadata {
        vault_id: input.vault_id,
        title: input.title,
        source: input.source,
    };
    if let Err(err) = store.upsert_chunks(&document_id, &meta, &upserts).await {
        // Compensate: the document row must not outlive its missing chunks.
        if let Err(cleanup) = documents::remove_document_row(pool, &document_id).await {
            tracing::error!(%document_id, error = %cleanup, "failed to roll back document row");
        }
        return Err(err);
    }

    tracing::info!(%document_id, "document indexed");
    Ok(document_id)
}
