//! Document listing, retrieval, and deletion.
//!
//! Documents are immutable once ingested; creation happens inside the
//! ingestion pipeline ([`crate::ingest`]). Deletion removes the chunks and
//! embeddings through the vector store before the document row, so a
//! half-finished delete retried later still converges.

use sqlx::{Row, SqlitePool};

use crate::error::ApiError;
use crate::models::{Document, now_ts};
use crate::vector_store::VectorStore;

/// A page of documents plus the unpaged total.
#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub documents: Vec<DocumentSummary>,
    pub total: i64,
}

/// Listing entry: metadata plus the chunk count.
#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub document: Document,
    pub chunk_count: i64,
}

/// Insert the document row. Called by the ingestion pipeline only.
pub async fn insert_document(pool: &SqlitePool, doc: &Document) -> Result<(), ApiError> {
    sqlx::query(
        "INSERT INTO documents (id, vault_id, title, source, metadata_json, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&doc.id)
    .bind(&doc.vault_id)
    .bind(&doc.title)
    .bind(&doc.source)
    .bind(doc.metadata.to_string())
    .bind(&doc.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Compensation for a failed ingest: remove the document row.
pub async fn remove_document_row(pool: &SqlitePool, document_id: &str) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_documents(
    pool: &SqlitePool,
    vault_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<DocumentPage, ApiError> {
    let (rows, total) = match vault_id {
        Some(vault) => {
            let rows = sqlx::query(
                "SELECT d.id, d.vault_id, d.title, d.source, d.metadata_json, d.created_at, \
                        (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count \
                 FROM documents d WHERE d.vault_id = ? \
                 ORDER BY d.created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(vault)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
            let total: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE vault_id = ?")
                    .bind(vault)
                    .fetch_one(pool)
                    .await?;
            (rows, total)
        }
        None => {
            let rows = sqlx::query(
                "SELECT d.id, d.vault_id, d.title, d.source, d.metadata_json, d.created_at, \
                        (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count \
                 FROM documents d \
                 ORDER BY d.created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
                .fetch_one(pool)
                .await?;
            (rows, total)
        }
    };

    let documents = rows
        .iter()
        .map(|row| DocumentSummary {
            document: row_to_document(row),
            chunk_count: row.get("chunk_count"),
        })
        .collect();

    Ok(DocumentPage { documents, total })
}

pub async fn get_document(
    pool: &SqlitePool,
    document_id: &str,
) -> Result<DocumentSummary, ApiError> {
    let row = sqlx::query(
        "SELECT d.id, d.vault_id, d.title, d.source, d.metadata_json, d.created_at, \
                (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count \
         FROM documents d WHERE d.id = ?",
    )
    .bind(document_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("document", document_id))?;

    Ok(DocumentSummary {
        document: row_to_document(&row),
        chunk_count: row.get("chunk_count"),
    })
}

/// Delete a document, its chunks, and its embeddings.
pub async fn delete_document(
    pool: &SqlitePool,
    store: &VectorStore,
    document_id: &str,
) -> Result<(), ApiError> {
    let found: Option<String> = sqlx::query_scalar("SELECT id FROM documents WHERE id = ?")
        .bind(document_id)
        .fetch_optional(pool)
        .await?;
    if found.is_none() {
        return Err(ApiError::not_found("document", document_id));
    }

    store.delete_by_document(document_id).await?;
    remove_document_row(pool, document_id).await?;

    tracing::info!(%document_id, "document deleted");
    Ok(())
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    let metadata_json: String = row.get("metadata_json");
    Document {
        id: row.get("id"),
        vault_id: row.get("vault_id"),
        title: row.get("title"),
        source: row.get("source"),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_else(|_| serde_json::json!({})),
        created_at: row.get("created_at"),
    }
}

/// Build a new document value with a fresh timestamp.
pub fn new_document(
    id: String,
    vault_id: Option<String>,
    title: Option<String>,
    source: Option<String>,
    metadata: serde_json::Value,
) -> Document {
    Document {
        id,
        vault_id,
        title,
        source,
        metadata,
        created_at: now_ts(),
    }
}
