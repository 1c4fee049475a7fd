//! Chunk/embedding persistence and cosine similarity search.
//!
//! The vector store is the sole writer of the `chunks` and `embeddings`
//! relations. Each embedding row denormalizes `{document_id, vault_id,
//! title, source}` from its owning document so vault-scoped search never
//! joins against `documents`, and vault cascade deletion can target
//! embeddings directly.
//!
//! Vectors are stored as little-endian f32 BLOBs; similarity is computed
//! in-process over the candidate set selected by the vault filter.
//!
//! # Filter semantics
//!
//! `Some(vault)` matches only embeddings denormalized with that vault id;
//! `None` matches only embeddings with a NULL vault id. "No vault" is not
//! "all vaults".

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::ApiError;

/// Maximum snippet length in characters.
const SNIPPET_CHARS: usize = 200;

/// A chunk ready for persistence: text plus its embedding vector.
#[derive(Debug, Clone)]
pub struct ChunkUpsert {
    pub ordinal: i64,
    pub text: String,
    pub token_count: i64,
    pub vector: Vec<f32>,
}

/// Document fields denormalized onto each embedding row at ingest time.
#[derive(Debug, Clone, Default)]
pub struct DenormMetadata {
    pub vault_id: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
}

/// A scored search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub title: Option<String>,
    /// Full chunk text, used by the prompt composer.
    pub text: String,
    /// First 200 characters with whitespace collapsed.
    pub snippet: String,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
    pub ordinal: i64,
}

/// Vault-aware vector persistence and top-k retrieval over SQLite.
#[derive(Clone)]
pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist all chunks and embeddings for a document in one transaction.
    ///
    /// Atomic per document: either every chunk becomes visible to
    /// subsequent searches or none does.
    pub async fn upsert_chunks(
        &self,
        document_id: &str,
        meta: &DenormMetadata,
        chunks: &[ChunkUpsert],
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            let chunk_id = Uuid::new_v4().to_string();

            sqlx::query(
                "INSERT INTO chunks (id, document_id, ordinal, text, token_count) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk_id)
            .bind(document_id)
            .bind(chunk.ordinal)
            .bind(&chunk.text)
            .bind(chunk.token_count)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO embeddings (chunk_id, document_id, vault_id, title, source, vector, dims) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk_id)
            .bind(document_id)
            .bind(&meta.vault_id)
            .bind(&meta.title)
            .bind(&meta.source)
            .bind(vec_to_blob(&chunk.vector))
            .bind(chunk.vector.len() as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Cosine top-k over embeddings in the given vault scope.
    ///
    /// Results are sorted by score descending; ties break by smaller
    /// ordinal, then smaller document id.
    pub async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        vault_id: Option<&str>,
    ) -> Result<Vec<SearchHit>, ApiError> {
        let rows = match vault_id {
            Some(vault) => {
                sqlx::query(
                    "SELECT e.chunk_id, e.document_id, e.title, e.vector, c.ordinal, c.text \
                     FROM embeddings e JOIN chunks c ON c.id = e.chunk_id \
                     WHERE e.vault_id = ?",
                )
                .bind(vault)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT e.chunk_id, e.document_id, e.title, e.vector, c.ordinal, c.text \
                     FROM embeddings e JOIN chunks c ON c.id = e.chunk_id \
                     WHERE e.vault_id IS NULL",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                let vector = blob_to_vec(&blob);
                let text: String = row.get("text");
                SearchHit {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    title: row.get("title"),
                    snippet: make_snippet(&text),
                    score: cosine_similarity(query, &vector),
                    ordinal: row.get("ordinal"),
                    text,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.ordinal.cmp(&b.ordinal))
                .then(a.document_id.cmp(&b.document_id))
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    /// Remove all chunks and embeddings for a document. Idempotent.
    pub async fn delete_by_document(&self, document_id: &str) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Remove all embeddings denormalized with the vault, and the chunks of
    /// the vault's documents. Idempotent.
    pub async fn delete_by_vault(&self, vault_id: &str) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM embeddings WHERE vault_id = ?")
            .bind(vault_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM chunks WHERE document_id IN \
             (SELECT id FROM documents WHERE vault_id = ?)",
        )
        .bind(vault_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// First 200 characters of the text with surrounding whitespace collapsed.
/// Shorter texts are returned whole.
pub fn make_snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SNIPPET_CHARS).collect()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for &v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in [-1, 1]. Returns 0.0 for empty or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
