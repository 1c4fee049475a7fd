//! HTTP API server.
//!
//! Exposes the service over JSON endpoints:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (status + version) |
//! | `POST` | `/vaults` | Create a vault |
//! | `GET`  | `/vaults` | List vaults with document counts |
//! | `GET`  | `/vaults/:id` | Get a single vault |
//! | `DELETE` | `/vaults/:id` | Delete a vault (cascades) |
//! | `POST` | `/ingest` | Ingest a document |
//! | `POST` | `/chat` | Conversational RAG turn |
//! | `GET`  | `/documents` | List documents (vault filter, paging) |
//! | `GET`  | `/documents/:id` | Get document metadata + chunk count |
//! | `DELETE` | `/documents/:id` | Delete a document |
//! | `POST` | `/agents` | Create an agent |
//! | `GET`  | `/agents` | List agents (vault filter) |
//! | `GET`  | `/agents/:id` | Get a single agent |
//! | `DELETE` | `/agents/:id` | Delete an agent |
//!
//! # Error contract
//!
//! All error responses share one body shape (see [`crate::error`]):
//!
//! ```json
//! { "error": "Conflict", "detail": "vault with name 'a' already exists", "code": "conflict" }
//! ```
//!
//! # Request lifecycle
//!
//! Every request gets a correlation id and a deadline derived from
//! `server.request_timeout_secs`; the deadline propagates into provider
//! calls and a timeout middleware turns an overrun into `504`. Body size
//! is capped by `server.max_request_bytes`.

use axum::extract::{DefaultBodyLimit, Path, Query, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

use crate::agents;
use crate::chat::{chat_turn, ChatParams, SessionLocks};
use crate::config::Config;
use crate::documents;
use crate::error::ApiError;
use crate::ingest::{ingest, IngestInput};
use crate::models::{Agent, Source, Vault};
use crate::provider::{build_providers, ChatCompleter, Embedder};
use crate::retry::Deadline;
use crate::vaults;
use crate::vector_store::VectorStore;
use crate::{db, migrate};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub store: VectorStore,
    pub embedder: Arc<dyn Embedder>,
    pub completer: Arc<dyn ChatCompleter>,
    pub locks: Arc<SessionLocks>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn ChatCompleter>,
    ) -> Self {
        let store = VectorStore::new(pool.clone());
        Self {
            config,
            pool,
            store,
            embedder,
            completer,
            locks: Arc::new(SessionLocks::new()),
        }
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.config.server.request_timeout())
    }
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let max_bytes = state.config.server.max_request_bytes;
    let request_timeout = state.config.server.request_timeout();

    Router::new()
        .route("/health", get(handle_health))
        .route("/vaults", post(handle_create_vault).get(handle_list_vaults))
        .route(
            "/vaults/:id",
            get(handle_get_vault).delete(handle_delete_vault),
        )
        .route("/ingest", post(handle_ingest))
        .route("/chat", post(handle_chat))
        .route("/documents", get(handle_list_documents))
        .route(
            "/documents/:id",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/agents", post(handle_create_agent).get(handle_list_agents))
        .route(
            "/agents/:id",
            get(handle_get_agent).delete(handle_delete_agent),
        )
        .layer(middleware::from_fn(move |req: Request, next: Next| {
            let request_id = Uuid::new_v4().to_string();
            let span = tracing::info_span!(
                "request",
                %request_id,
                method = %req.method(),
                path = %req.uri().path()
            );
            async move {
                match tokio::time::timeout(request_timeout, next.run(req)).await {
                    Ok(response) => response,
                    Err(_) => {
                        tracing::warn!("request exceeded deadline");
                        ApiError::Timeout.into_response()
                    }
                }
            }
            .instrument(span)
        }))
        .layer(DefaultBodyLimit::max(max_bytes))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = &config.server.cors_origins;
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the HTTP server with real providers. Runs until terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.db).await?;
    migrate::run_migrations(&pool).await?;

    let (embedder, completer) = build_providers(&config.provider)?;
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(Arc::new(config), pool, embedder, completer);
    let app = build_router(state);

    tracing::info!(%bind_addr, "server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Vaults ============

#[derive(Deserialize)]
struct CreateVaultRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct VaultResponse {
    vault_id: String,
    name: String,
    description: Option<String>,
    created_at: String,
    document_count: i64,
}

impl VaultResponse {
    fn from_vault(vault: Vault, document_count: i64) -> Self {
        Self {
            vault_id: vault.vault_id,
            name: vault.name,
            description: vault.description,
            created_at: vault.created_at,
            document_count,
        }
    }
}

async fn handle_create_vault(
    State(state): State<AppState>,
    Json(req): Json<CreateVaultRequest>,
) -> Result<(StatusCode, Json<VaultResponse>), ApiError> {
    let vault = vaults::create_vault(&state.pool, &req.name, req.description.as_deref()).await?;
    Ok((
        StatusCode::CREATED,
        Json(VaultResponse::from_vault(vault, 0)),
    ))
}

async fn handle_list_vaults(
    State(state): State<AppState>,
) -> Result<Json<Vec<VaultResponse>>, ApiError> {
    let list = vaults::list_vaults(&state.pool).await?;
    Ok(Json(
        list.into_iter()
            .map(|v| VaultResponse::from_vault(v.vault, v.document_count))
            .collect(),
    ))
}

async fn handle_get_vault(
    State(state): State<AppState>,
    Path(vault_id): Path<String>,
) -> Result<Json<VaultResponse>, ApiError> {
    let found = vaults::get_vault(&state.pool, &vault_id).await?;
    Ok(Json(VaultResponse::from_vault(
        found.vault,
        found.document_count,
    )))
}

#[derive(Serialize)]
struct VaultDeleteResponse {
    vault_id: String,
    status: String,
}

async fn handle_delete_vault(
    State(state): State<AppState>,
    Path(vault_id): Path<String>,
) -> Result<Json<VaultDeleteResponse>, ApiError> {
    vaults::delete_vault(&state.pool, &state.store, &vault_id).await?;
    Ok(Json(VaultDeleteResponse {
        vault_id,
        status: "deleted".to_string(),
    }))
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    text: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    vault_id: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct IngestResponse {
    document_id: String,
    status: String,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let input = IngestInput {
        text: req.text,
        title: req.title,
        source: req.source,
        vault_id: req.vault_id,
        metadata: req.metadata.unwrap_or_else(|| serde_json::json!({})),
    };
    let document_id = ingest(
        &state.pool,
        &state.store,
        state.embedder.as_ref(),
        &state.config.chunking,
        input,
        state.deadline(),
    )
    .await?;

    Ok(Json(IngestResponse {
        document_id,
        status: "indexed".to_string(),
    }))
}

// ============ POST /chat ============

#[derive(Deserialize, Default)]
struct ChatRequestConfig {
    #[serde(default)]
    top_k: Option<i64>,
    #[serde(default)]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatRequest {
    session_id: String,
    message: String,
    #[serde(default)]
    vault_id: Option<String>,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    config: Option<ChatRequestConfig>,
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    answer: String,
    sources: Vec<Source>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let turn_config = req.config.unwrap_or_default();

    let top_k = match turn_config.top_k {
        Some(k) if k < 1 => {
            return Err(ApiError::Validation("top_k must be >= 1".to_string()));
        }
        Some(k) => k as usize,
        None => state.config.chat.top_k_default,
    };

    let temperature = match turn_config.temperature {
        Some(t) if !(0.0..=2.0).contains(&t) => {
            return Err(ApiError::Validation(
                "temperature must be in [0.0, 2.0]".to_string(),
            ));
        }
        Some(t) => t,
        None => state.config.chat.default_temperature,
    };

    // An agent supplies its system prompt; its vault applies unless the
    // request names one explicitly.
    let mut vault_id = req.vault_id;
    let mut system_prompt = None;
    if let Some(ref agent_id) = req.agent_id {
        let agent = agents::get_agent(&state.pool, agent_id).await?;
        if vault_id.is_none() {
            vault_id = Some(agent.vault_id);
        }
        system_prompt = Some(agent.system_prompt);
    }

    let params = ChatParams {
        vault_id,
        top_k,
        temperature,
        system_prompt,
    };

    let outcome = chat_turn(
        &state.pool,
        &state.store,
        state.embedder.as_ref(),
        state.completer.as_ref(),
        &state.locks,
        &state.config.chat,
        &req.session_id,
        req.user_id.as_deref(),
        &req.message,
        params,
        state.deadline(),
    )
    .await?;

    Ok(Json(ChatResponse {
        session_id: req.session_id,
        answer: outcome.answer,
        sources: outcome.sources,
    }))
}

// ============ Documents ============

#[derive(Deserialize)]
struct ListDocumentsQuery {
    #[serde(default)]
    vault_id: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

#[derive(Serialize)]
struct DocumentItem {
    id: String,
    vault_id: Option<String>,
    title: Option<String>,
    source: Option<String>,
    metadata: serde_json::Value,
    created_at: String,
    chunk_count: i64,
}

impl From<documents::DocumentSummary> for DocumentItem {
    fn from(summary: documents::DocumentSummary) -> Self {
        Self {
            id: summary.document.id,
            vault_id: summary.document.vault_id,
            title: summary.document.title,
            source: summary.document.source,
            metadata: summary.document.metadata,
            created_at: summary.document.created_at,
            chunk_count: summary.chunk_count,
        }
    }
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentItem>,
    total: i64,
    limit: i64,
    offset: i64,
}

async fn handle_list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);
    if limit < 1 {
        return Err(ApiError::Validation("limit must be >= 1".to_string()));
    }
    if offset < 0 {
        return Err(ApiError::Validation("offset must be >= 0".to_string()));
    }

    let page =
        documents::list_documents(&state.pool, query.vault_id.as_deref(), limit, offset).await?;

    Ok(Json(DocumentsResponse {
        documents: page.documents.into_iter().map(DocumentItem::from).collect(),
        total: page.total,
        limit,
        offset,
    }))
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentItem>, ApiError> {
    let summary = documents::get_document(&state.pool, &document_id).await?;
    Ok(Json(DocumentItem::from(summary)))
}

#[derive(Serialize)]
struct DocumentDeleteResponse {
    message: String,
    document_id: String,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentDeleteResponse>, ApiError> {
    documents::delete_document(&state.pool, &state.store, &document_id).await?;
    Ok(Json(DocumentDeleteResponse {
        message: format!("Document {document_id} deleted"),
        document_id,
    }))
}

// ============ Agents ============

#[derive(Deserialize)]
struct CreateAgentRequest {
    name: String,
    vault_id: String,
    system_prompt: String,
}

#[derive(Serialize)]
struct AgentResponse {
    agent_id: String,
    name: String,
    vault_id: String,
    system_prompt: String,
    created_at: String,
}

impl From<Agent> for AgentResponse {
    fn from(agent: Agent) -> Self {
        Self {
            agent_id: agent.agent_id,
            name: agent.name,
            vault_id: agent.vault_id,
            system_prompt: agent.system_prompt,
            created_at: agent.created_at,
        }
    }
}

async fn handle_create_agent(
    State(state): State<AppState>,
    Json(req): Json<CreateAgentRequest>,
) -> Result<Json<AgentResponse>, ApiError> {
    let agent =
        agents::create_agent(&state.pool, &req.name, &req.vault_id, &req.system_prompt).await?;
    Ok(Json(AgentResponse::from(agent)))
}

#[derive(Deserialize)]
struct ListAgentsQuery {
    #[serde(default)]
    vault_id: Option<String>,
}

async fn handle_list_agents(
    State(state): State<AppState>,
    Query(query): Query<ListAgentsQuery>,
) -> Result<Json<Vec<AgentResponse>>, ApiError> {
    let list = agents::list_agents(&state.pool, query.vault_id.as_deref()).await?;
    Ok(Json(list.into_iter().map(AgentResponse::from).collect()))
}

async fn handle_get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentResponse>, ApiError> {
    let agent = agents::get_agent(&state.pool, &agent_id).await?;
    Ok(Json(AgentResponse::from(agent)))
}

#[derive(Serialize)]
struct AgentDeleteResponse {
    success: bool,
    message: String,
}

async fn handle_delete_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentDeleteResponse>, ApiError> {
    agents::delete_agent(&state.pool, &agent_id).await?;
    Ok(Json(AgentDeleteResponse {
        success: true,
        message: format!("Agent {agent_id} deleted"),
    }))
}