//! # ragserve CLI
//!
//! The `ragserve` binary starts the question-answering HTTP server and
//! provides an ingestion command for local PDF files.
//!
//! ## Usage
//!
//! ```bash
//! ragserve --config ./config/ragserve.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragserve serve` | Start the HTTP API server |
//! | `ragserve ingest <path>` | Extract, embed, and index a local PDF |
//!
//! ## Examples
//!
//! ```bash
//! # Start the server
//! ragserve serve --config ./config/ragserve.toml
//!
//! # Index a local policy document under an explicit id
//! ragserve ingest ./policy.pdf --document-id policy-2024
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragserve::{config, ingest, server};

/// ragserve — retrieval-augmented question answering over PDF documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragserve.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ragserve",
    about = "Retrieval-augmented question answering over PDF documents",
    version,
    long_about = "ragserve ingests PDF documents (extracting text and tables, chunking, \
    embedding, and upserting vectors to a managed index) and answers questions about them \
    via hybrid search and a hosted LLM, exposed over an HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragserve.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind` and serves `POST /run`, `GET /health`, and
    /// `GET /metrics`. Requires index and LLM credentials in the
    /// environment and verifies the embedding dimension on startup.
    Serve,

    /// Ingest a local PDF into the vector index.
    ///
    /// Extracts text and tables, chunks, embeds, and upserts the document
    /// so it can be queried via `POST /run` with a `document_id`.
    Ingest {
        /// Path to the PDF file.
        path: PathBuf,

        /// Document id to index under. Defaults to the file name.
        #[arg(long)]
        document_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { path, document_id } => {
            ingest::run_ingest(&cfg, &path, document_id).await?;
        }
    }

    Ok(())
}
