//! # Vaultrag
//!
//! **A multi-tenant conversational RAG service with vault-scoped retrieval.**
//!
//! Vaultrag ingests text documents into isolated *vaults*, indexes them as
//! dense-vector chunks, and answers chat messages by retrieving vault-scoped
//! chunks and composing them with the session's recent conversation history
//! for an OpenAI-compatible chat model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────────┐
//! │  HTTP (Axum) │──▶│   Services    │──▶│    SQLite      │
//! │ /ingest /chat│   │ ingest · chat │   │ metadata + vec │
//! │ /vaults ...  │   │ vaults agents │   └───────┬───────┘
//! └──────────────┘   └───────┬───────┘           │
//!                            ▼                   ▼
//!                    ┌───────────────┐   ┌───────────────┐
//!                    │   Providers   │   │  VectorStore  │
//!                    │ embed · chat  │   │ cosine top-k  │
//!                    └───────────────┘   └───────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. **Ingestion** ([`ingest`]): validate → chunk ([`chunker`]) → embed
//!    ([`provider`]) → persist document row + chunk vectors atomically
//!    ([`vector_store`]).
//! 2. **Chat** ([`chat`]): load bounded history ([`sessions`]), persist the
//!    user message, embed the query, run vault-scoped cosine top-k search,
//!    compose the prompt, call the chat model, persist the reply.
//! 3. **Entities** ([`vaults`], [`documents`], [`agents`]): CRUD with
//!    uniqueness checks and leaves-first cascade deletion.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Typed error taxonomy and HTTP status mapping |
//! | [`models`] | Core data types: `Vault`, `Document`, `Session`, `Message`, `Agent` |
//! | [`chunker`] | Sliding-window text chunker with configurable overlap |
//! | [`retry`] | Backoff executor and request deadlines for provider calls |
//! | [`provider`] | `Embedder` / `ChatCompleter` traits and OpenAI-compatible adapters |
//! | [`vector_store`] | Chunk/embedding persistence and cosine similarity search |
//! | [`ingest`] | Ingestion pipeline: validate → chunk → embed → persist |
//! | [`chat`] | Retrieval + memory core: the conversational RAG turn |
//! | [`vaults`] | Vault CRUD with cascade deletion |
//! | [`documents`] | Document listing, retrieval, and deletion |
//! | [`sessions`] | Sessions and append-only message history |
//! | [`agents`] | Named agent configurations bound to vaults |
//! | [`server`] | HTTP API (Axum) with CORS, body limits, and timeouts |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |

pub mod agents;
pub mod chat;
pub mod chunker;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod provider;
pub mod retry;
pub mod server;
pub mod sessions;
pub mod vaults;
pub mod vector_store;
