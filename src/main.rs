//! # Vaultrag server (`vaultrag`)
//!
//! Binary entry point for the conversational RAG service.
//!
//! ## Usage
//!
//! ```bash
//! vaultrag --config ./config/vaultrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vaultrag init` | Create the SQLite database and run schema migrations |
//! | `vaultrag serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! vaultrag init --config ./config/vaultrag.toml
//!
//! # Start the API server
//! OPENAI_API_KEY=sk-... vaultrag serve --config ./config/vaultrag.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vaultrag::{config, db, migrate, server};

/// Vaultrag — a multi-tenant conversational RAG service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/vaultrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "vaultrag",
    about = "Vaultrag — a multi-tenant conversational RAG service with vault-scoped retrieval",
    version,
    long_about = "Vaultrag ingests text documents into isolated vaults, indexes them as \
    dense-vector chunks, and answers chat messages by retrieving vault-scoped chunks and \
    composing them with conversation history for an OpenAI-compatible chat model."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vaultrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (vaults,
    /// documents, chunks, embeddings, sessions, messages, agents). This
    /// command is idempotent.
    Init,

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// ingest, chat, vault, document, and agent endpoints. Runs schema
    /// migrations on startup.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
    }

    Ok(())
}
