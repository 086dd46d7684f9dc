//! # docqa CLI (`dqa`)
//!
//! The `dqa` binary is the primary interface for docqa. It provides
//! commands for index initialization, document ingestion, asking
//! questions, raw similarity search, memory management, and starting the
//! HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! dqa --config ./config/dqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dqa init` | Create the SQLite index and schema |
//! | `dqa ingest [path]` | Ingest a file, a directory, or the document store |
//! | `dqa ask "<question>"` | Answer a question |
//! | `dqa search "<query>"` | Show the raw chunks similarity search returns |
//! | `dqa clear-memory` | Drop the conversation log |
//! | `dqa serve` | Start the JSON HTTP server |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docqa::config::{load_config, Config};
use docqa::embedding::create_embedder;
use docqa::engine::QaEngine;
use docqa::index::VectorIndex;
use docqa::ingest::{ingest_path, ingest_store, IngestReport};
use docqa::memory::ConversationMemory;
use docqa::server::run_server;
use docqa::store::DocumentStore;

/// docqa — document question answering over a local vector index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dqa",
    about = "docqa — document question answering over a local vector index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the vector index.
    ///
    /// Creates the SQLite database file and schema. Idempotent — running
    /// it multiple times is safe.
    Init,

    /// Ingest documents into the index.
    ///
    /// With a path: ingest that file, or every supported file under that
    /// directory. Without a path: ingest everything in the configured
    /// document store. Documents whose content is unchanged are skipped.
    Ingest {
        /// File or directory to ingest. Defaults to the document store.
        path: Option<PathBuf>,

        /// Reindex documents even when their content is unchanged.
        #[arg(long)]
        full: bool,
    },

    /// Ask a question and print the answer with its sources.
    Ask {
        /// The question text.
        question: String,
    },

    /// Show the raw chunks similarity search returns for a query.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Only show hits scoring strictly above this cosine similarity.
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Drop the persisted conversation log.
    ClearMemory,

    /// Start the JSON HTTP server.
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
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest { path, full } => run_ingest(&config, path, full).await,
        Commands::Ask { question } => run_ask(&config, &question).await,
        Commands::Search {
            query,
            limit,
            threshold,
        } => run_search(&config, &query, limit, threshold).await,
        Commands::ClearMemory => run_clear_memory(&config),
        Commands::Serve => run_server(&config).await,
    }
}

async fn open_index(config: &Config) -> anyhow::Result<VectorIndex> {
    let embedder = create_embedder(&config.embedding)?;
    let index = VectorIndex::open(&config.db.path, embedder, config.embedding.batch_size)
        .await
        .with_context(|| format!("Failed to open index at {}", config.db.path.display()))?;
    Ok(index)
}

async fn run_init(config: &Config) -> anyhow::Result<()> {
    let index = open_index(config).await?;
    index.close().await;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

async fn run_ingest(config: &Config, path: Option<PathBuf>, full: bool) -> anyhow::Result<()> {
    if !config.embedding.is_enabled() {
        anyhow::bail!("Ingestion requires embeddings. Set [embedding] provider in config.");
    }

    let index = open_index(config).await?;
    let report = match &path {
        Some(path) => {
            ingest_path(&index, &config.chunking, &config.storage, path, full).await?
        }
        None => {
            let store = DocumentStore::new(config.storage.root.clone());
            ingest_store(&index, &config.chunking, &store, full).await?
        }
    };

    print_report(
        &path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| config.storage.root.display().to_string()),
        &report,
    );
    index.close().await;
    Ok(())
}

fn print_report(target: &str, report: &IngestReport) {
    println!("ingest {}", target);
    println!("  documents indexed: {}", report.documents_indexed);
    println!("  chunks indexed: {}", report.chunks_indexed);
    println!("  skipped (up to date): {}", report.skipped_up_to_date);
    println!("  failures: {}", report.failures);
    println!("ok");
}

async fn run_ask(config: &Config, question: &str) -> anyhow::Result<()> {
    let mut engine = QaEngine::from_config(config).await?;
    let result = engine.answer_question(question).await;

    println!("{}", result.answer);
    if result.from_knowledge_base {
        println!();
        println!("sources:");
        for (i, source) in result.sources.iter().enumerate() {
            println!("  {}. \"{}\"", i + 1, source.replace('\n', " ").trim());
        }
    }
    Ok(())
}

async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    threshold: Option<f64>,
) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let index = open_index(config).await?;
    let k = limit.unwrap_or(config.retrieval.top_k);
    let results = match threshold {
        Some(threshold) => index.search_with_threshold(query, k, threshold).await?,
        None => index.search(query, k).await?,
    };

    if results.is_empty() {
        println!("No results.");
    } else {
        for (i, result) in results.iter().enumerate() {
            println!(
                "{}. [{:.3}] {}",
                i + 1,
                result.score,
                result.metadata.source
            );
            println!("    \"{}\"", result.text.replace('\n', " ").trim());
            println!("    file id: {}", result.metadata.file_id);
            println!();
        }
    }

    index.close().await;
    Ok(())
}

fn run_clear_memory(config: &Config) -> anyhow::Result<()> {
    let mut memory = ConversationMemory::load(&config.memory.path);
    memory
        .clear()
        .context("Failed to clear conversation memory")?;
    println!("memory cleared");
    Ok(())
}
