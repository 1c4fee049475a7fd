use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: String,
    #[serde(default = "default_pool_min")]
    pub pool_min: u32,
    #[serde(default = "default_pool_max")]
    pub pool_max: u32,
}

fn default_pool_min() -> u32 {
    1
}
fn default_pool_max() -> u32 {
    5
}

/// Settings for the OpenAI-compatible embedding and chat endpoints.
///
/// Model identifiers are passed through to the provider verbatim; no
/// allow-list is applied, so custom gateways with non-standard model
/// names work unchanged.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// API key. Falls back to the `OPENAI_API_KEY` environment variable
    /// when absent from the config file.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            chat_model: default_chat_model(),
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            max_retries: default_max_retries(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dimension() -> usize {
    1536
}
fn default_chat_model() -> String {
    "gpt-4.1-mini".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_retries() -> u32 {
    3
}
fn default_provider_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_tokens")]
    pub window_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_tokens: default_window_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

fn default_window_tokens() -> usize {
    512
}
fn default_overlap_tokens() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history_messages: default_max_history_messages(),
            top_k_default: default_top_k(),
            default_temperature: default_temperature(),
        }
    }
}

fn default_max_history_messages() -> usize {
    10
}
fn default_top_k() -> usize {
    5
}
fn default_temperature() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
            max_request_bytes: default_max_request_bytes(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_max_request_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl ProviderConfig {
    /// Resolve the API key from the config file or the environment.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.api_key {
            if !key.trim().is_empty() {
                return Ok(key.trim().to_string());
            }
        }
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|k| k.trim().to_string())
            .context("provider.api_key not set and OPENAI_API_KEY is not in the environment")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

/// Validate cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.db.pool_min < 1 {
        anyhow::bail!("db.pool_min must be >= 1");
    }
    if config.db.pool_max < config.db.pool_min {
        anyhow::bail!("db.pool_max must be >= db.pool_min");
    }

    if config.provider.embedding_dimension == 0 {
        anyhow::bail!("provider.embedding_dimension must be > 0");
    }
    if config.provider.batch_size == 0 {
        anyhow::bail!("provider.batch_size must be > 0");
    }
    if config.provider.max_concurrency == 0 {
        anyhow::bail!("provider.max_concurrency must be > 0");
    }

    if config.chunking.window_tokens == 0 {
        anyhow::bail!("chunking.window_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.window_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < chunking.window_tokens");
    }

    if config.chat.max_history_messages < 1 {
        anyhow::bail!("chat.max_history_messages must be >= 1");
    }
    if config.chat.top_k_default < 1 {
        anyhow::bail!("chat.top_k_default must be >= 1");
    }
    if !(0.0..=2.0).contains(&config.chat.default_temperature) {
        anyhow::bail!("chat.default_temperature must be in [0.0, 2.0]");
    }

    if config.server.max_request_bytes == 0 {
        anyhow::bail!("server.max_request_bytes must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            db: DbConfig {
                path: "data/vaultrag.sqlite".to_string(),
                pool_min: 1,
                pool_max: 5,
            },
            provider: ProviderConfig::default(),
            chunking: ChunkingConfig::default(),
            chat: ChatConfig::default(),
            server: ServerConfig::default(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        let mut config = base_config();
        config.chunking.window_tokens = 64;
        config.chunking.overlap_tokens = 64;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn pool_max_must_cover_pool_min() {
        let mut config = base_config();
        config.db.pool_min = 8;
        config.db.pool_max = 2;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let mut config = base_config();
        config.chat.default_temperature = 2.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn parses_minimal_toml() {
        let config: Config = toml::from_str(
            r#"
            [db]
            path = "/tmp/test.sqlite"
            "#,
        )
        .unwrap();
        assert_eq!(config.chat.top_k_default, 5);
        assert_eq!(config.chat.max_history_messages, 10);
        assert_eq!(config.provider.embedding_dimension, 1536);
        assert_eq!(config.server.request_timeout_secs, 60);
        assert!(validate(&config).is_ok());
    }
}
