//! Typed error taxonomy and HTTP status mapping.
//!
//! Inner layers raise [`ApiError`] variants; the HTTP boundary renders them
//! as a uniform JSON body:
//!
//! ```json
//! { "error": "Not Found", "detail": "Vault not found: ...", "code": "not_found" }
//! ```
//!
//! Provider retries happen inside the adapters ([`crate::provider`]); by the
//! time an error reaches this type, retries are exhausted and the failure is
//! final for the request. Error bodies never contain secrets or backtraces.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Domain error for all service operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input (empty document text, negative top_k).
    #[error("{0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// Uniqueness violation (duplicate vault name, duplicate agent name).
    #[error("{0}")]
    Conflict(String),

    /// The embedding or chat provider failed after retries were exhausted.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The metadata or vector store is unreachable.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The request exceeded its deadline.
    #[error("request deadline exceeded")]
    Timeout,

    /// Invariant violation; logged with the request correlation id.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Timeout => "timeout",
            Self::Internal(_) => "internal",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::NotFound { .. } => "Not Found",
            Self::Conflict(_) => "Conflict",
            Self::ProviderUnavailable(_) => "Bad Gateway",
            Self::StoreUnavailable(_) => "Service Unavailable",
            Self::Timeout => "Gateway Timeout",
            Self::Internal(_) => "Internal Server Error",
        }
    }
}

/// Uniform JSON error body rendered at the HTTP boundary.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.label(),
            detail: self.to_string(),
            code: self.code(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::StoreUnavailable(err.to_string())
            }
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(err.to_string())
            }
            _ => Self::Internal(err.to_string()),
        }
    }
}
