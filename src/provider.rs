//! Provider adapters for embeddings and chat completion.
//!
//! Both adapters wrap an OpenAI-compatible HTTP endpoint with a
//! configurable base URL. The configured model identifier is sent verbatim;
//! no allow-list is applied, so gateways exposing non-standard model names
//! work unchanged.
//!
//! # Failure taxonomy
//!
//! | Condition | Classification |
//! |-----------|----------------|
//! | Timeout, connect error | [`ProviderError::Transient`] |
//! | HTTP 429, 5xx | [`ProviderError::Transient`] |
//! | Other 4xx | [`ProviderError::Permanent`] |
//! | Response schema mismatch (wrong vector length) | [`ProviderError::Permanent`] |
//!
//! Transient failures are retried by the executor in [`crate::retry`] (up
//! to 3 attempts, exponential backoff with jitter); anything that survives
//! the adapter surfaces as `ProviderUnavailable` at the service layer.
//!
//! In-flight provider requests are bounded by a semaphore shared between
//! the embedder and the chat completer; excess callers queue on the
//! semaphore rather than an unbounded channel.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::ProviderConfig;
use crate::error::ApiError;
use crate::models::ChatMessage;
use crate::retry::{with_retry, Deadline, RetryPolicy, Retryable};

/// Failure of a single provider call, classified for retry.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Retry candidate: timeouts, 429s, 5xx, connect failures.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Not worth retrying: other 4xx, malformed responses.
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl Retryable for ProviderError {
    fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        ApiError::ProviderUnavailable(err.to_string())
    }
}

/// Text → fixed-dimension vector capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input, in order.
    async fn embed(
        &self,
        texts: &[String],
        deadline: Deadline,
    ) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Fixed output dimension D.
    fn dimension(&self) -> usize;
}

/// Ordered messages → reply text capability.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        deadline: Deadline,
    ) -> Result<String, ProviderError>;
}

/// Shared HTTP plumbing for both adapters: bearer auth, bounded
/// concurrency, retry with backoff, status classification.
struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
    call_timeout: Duration,
}

impl ProviderClient {
    async fn post_json(&self, path: &str, body: &Value, deadline: Deadline) -> Result<Value, ProviderError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ProviderError::Permanent("provider client shut down".to_string()))?;

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);

        with_retry(&self.policy, deadline, |_attempt| async {
            let remaining = deadline
                .remaining()
                .ok_or_else(|| ProviderError::Permanent("request deadline exceeded".to_string()))?;

            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .timeout(self.call_timeout.min(remaining))
                .json(body)
                .send()
                .await
                .map_err(classify_reqwest_error)?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<Value>()
                    .await
                    .map_err(|e| ProviderError::Permanent(format!("invalid provider response: {e}")));
            }

            let body_text = response.text().await.unwrap_or_default();
            Err(classify_status(status, &body_text))
        })
        .await
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ProviderError::Transient(err.to_string())
    } else {
        ProviderError::Permanent(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let detail = format!("provider returned {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Transient(detail)
    } else {
        ProviderError::Permanent(detail)
    }
}

// ============ OpenAI-compatible embedder ============

/// Embedder backed by `POST {base_url}/embeddings`.
pub struct OpenAiEmbedder {
    client: Arc<ProviderClient>,
    model: String,
    dims: usize,
    batch_size: usize,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(
        &self,
        texts: &[String],
        deadline: Deadline,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());

        // Split into provider-sized batches; order is preserved because
        // batches run sequentially and each response is re-sorted by index.
        for batch in texts.chunks(self.batch_size.max(1)) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = self.client.post_json("embeddings", &body, deadline).await?;
            let mut parsed = parse_embedding_response(&json, batch.len(), self.dims)?;
            vectors.append(&mut parsed);
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dims
    }
}

/// Extract `data[].embedding` ordered by `data[].index`, verifying the
/// expected count and dimension.
fn parse_embedding_response(
    json: &Value,
    expected_count: usize,
    expected_dims: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ProviderError::Permanent("embedding response missing data array".to_string()))?;

    if data.len() != expected_count {
        return Err(ProviderError::Permanent(format!(
            "embedding response has {} vectors, expected {}",
            data.len(),
            expected_count
        )));
    }

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for item in data {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .ok_or_else(|| ProviderError::Permanent("embedding item missing index".to_string()))?
            as usize;
        let vector: Vec<f32> = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| ProviderError::Permanent("embedding item missing vector".to_string()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vector.len() != expected_dims {
            return Err(ProviderError::Permanent(format!(
                "embedding vector has dimension {}, expected {}",
                vector.len(),
                expected_dims
            )));
        }

        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ OpenAI-compatible chat completer ============

/// Chat completer backed by `POST {base_url}/chat/completions`.
pub struct OpenAiChat {
    client: Arc<ProviderClient>,
    model: String,
}

#[async_trait]
impl ChatCompleter for OpenAiChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        deadline: Deadline,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
        });
        let json = self
            .client
            .post_json("chat/completions", &body, deadline)
            .await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &Value) -> Result<String, ProviderError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            ProviderError::Permanent("chat response missing choices[0].message.content".to_string())
        })
}

/// Construct the embedder and chat completer from configuration.
///
/// Both adapters share one HTTP client, one retry policy, and one
/// concurrency semaphore.
pub fn build_providers(
    config: &ProviderConfig,
) -> anyhow::Result<(Arc<dyn Embedder>, Arc<dyn ChatCompleter>)> {
    let api_key = config.resolve_api_key()?;

    let client = Arc::new(ProviderClient {
        http: reqwest::Client::builder().build()?,
        base_url: config.base_url.clone(),
        api_key,
        policy: RetryPolicy::with_attempts(config.max_retries.max(1)),
        permits: Arc::new(Semaphore::new(config.max_concurrency)),
        call_timeout: config.timeout(),
    });

    let embedder = Arc::new(OpenAiEmbedder {
        client: Arc::clone(&client),
        model: config.embedding_model.clone(),
        dims: config.embedding_dimension,
        batch_size: config.batch_size,
    });

    let chat = Arc::new(OpenAiChat {
        client,
        model: config.chat_model.clone(),
    });

    Ok((embedder, chat))
}
