//! Database schema migrations.
//!
//! Creates all required tables and ensures idempotent execution.
//! Designed to be run via `vaultrag init` and at test setup.
//!
//! # Schema
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   vaults     │──┐  │  documents   │──┐  │   chunks     │──┐
//! │              │  │  │              │  │  │              │  │
//! │ vault_id(PK) │  └──│ vault_id?    │  └──│ document_id  │  │
//! │ name UNIQUE  │     │ id (PK)      │     │ id (PK)      │  │
//! │ description  │     │ title        │     │ ordinal      │  │
//! │ created_at   │     │ source       │     │ text         │  │
//! └──────┬───────┘     │ metadata_json│     │ token_count  │  │
//!        │             │ created_at   │     └──────────────┘  │
//!        │             └──────────────┘                       │
//!        │             ┌──────────────┐     ┌──────────────┐  │
//!        └─────────────│   agents     │     │  embeddings  │──┘
//!                      │              │     │              │
//!                      │ agent_id(PK) │     │ chunk_id(PK) │
//!                      │ name         │     │ document_id  │
//!                      │ vault_id     │     │ vault_id?    │
//!                      │ system_prompt│     │ title/source │
//!                      │ created_at   │     │ vector BLOB  │
//!                      └──────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌──────────────┐
//! │  sessions    │──┐  │  messages    │
//! │              │  │  │              │
//! │ id (PK)      │  └──│ session_id   │
//! │ user_id?     │     │ id (PK, ai)  │
//! │ created_at   │     │ role CHECK   │
//! │ last_active  │     │ content      │
//! └──────────────┘     │ created_at   │
//!                      └──────────────┘
//! ```
//!
//! The `embeddings` relation denormalizes `{document_id, vault_id, title,
//! source}` from the owning document so that vault-scoped retrieval never
//! joins against `documents`. Vectors are stored as little-endian f32 BLOBs.
//!
//! # Idempotency
//!
//! All statements use `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT
//! EXISTS`. Running `vaultrag init` multiple times is safe.

use anyhow::Result;
use sqlx::SqlitePool;

/// Run all database migrations. Safe to call multiple times.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vaults (
            vault_id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            vault_id TEXT REFERENCES vaults(vault_id),
            title TEXT,
            source TEXT,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES documents(id),
            ordinal INTEGER NOT NULL,
            text TEXT NOT NULL,
            token_count INTEGER NOT NULL,
            UNIQUE(document_id, ordinal)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            chunk_id TEXT PRIMARY KEY REFERENCES chunks(id),
            document_id TEXT NOT NULL,
            vault_id TEXT,
            title TEXT,
            source TEXT,
            vector BLOB NOT NULL,
            dims INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            created_at TEXT NOT NULL,
            last_active_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL REFERENCES sessions(id),
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            agent_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            vault_id TEXT NOT NULL REFERENCES vaults(vault_id),
            system_prompt TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(name, vault_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for common query patterns
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_vault_id ON documents(vault_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_vault_id ON embeddings(vault_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_document_id ON embeddings(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_last_active ON sessions(last_active_at)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_session_created \
         ON messages(session_id, created_at DESC, id DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_agents_vault_name ON agents(vault_id, name)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_agents_created_at ON agents(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
