//! # Document Q&A CLI (`docqa`)
//!
//! The `docqa` binary answers questions about PDF documents with
//! streamed, cited answers. It can run as a one-shot CLI or as an HTTP
//! server speaking server-sent events.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ask "<question>" --file a.pdf` | Ingest PDFs and stream a cited answer |
//! | `docqa serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Ask a question about two reports
//! docqa ask "What were the Q3 findings?" --file q3.pdf --file notes.pdf
//!
//! # Narrower retrieval
//! docqa ask "Summarize the methodology" --file paper.pdf --k 3
//!
//! # Start the server
//! docqa serve --config ./config/docqa.toml
//! ```
//!
//! Both commands call OpenAI and require `OPENAI_API_KEY` to be set.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;

use docqa::config::{self, Config};
use docqa::ingest::Ingestor;
use docqa::openai::{OpenAiEmbeddings, OpenAiGeneration};
use docqa::server::{self, AppState};

use docqa_core::index::InMemoryIndex;
use docqa_core::repository::{DocumentRepository, InMemoryRepository};
use docqa_core::retriever::Retriever;
use docqa_core::{AskRequest, Orchestrator, StreamEvent};

/// Document Q&A — streamed, cited answers over your own PDFs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example; every
/// setting has a default, so a missing file is fine.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Document Q&A — streamed, cited answers over your own PDFs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ask a question about one or more PDF files.
    ///
    /// Ingests the given files into an in-memory index, retrieves the
    /// most relevant chunks, and streams the answer to stdout followed
    /// by its citations.
    Ask {
        /// The question to answer (1 to 1000 characters).
        question: String,

        /// PDF file to ingest. Repeat for multiple files.
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Number of chunks to retrieve (1 to 20).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// document upload, listing, deletion, and streaming `/ask`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docqa=info,docqa_core=info".into()),
        )
        .init();

    let cli = Cli::parse();
    // load_config validates; the built-in defaults are always valid.
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Ask { question, files, k } => run_ask(&cfg, &question, &files, k).await,
        Commands::Serve => {
            let state = build_state(&cfg)?;
            server::run_server(state).await
        }
    }
}

/// Wires the shared components behind the HTTP handlers.
fn build_state(cfg: &Config) -> anyhow::Result<AppState> {
    let index = Arc::new(InMemoryIndex::new());
    let repo = Arc::new(InMemoryRepository::new());
    let embedder = Arc::new(OpenAiEmbeddings::new(&cfg.embedding)?);
    let generator = Arc::new(OpenAiGeneration::new(&cfg.generation)?);

    let retriever = Arc::new(Retriever::new(index.clone(), cfg.retriever_config()));
    let orchestrator = Arc::new(Orchestrator::new(
        retriever,
        embedder.clone(),
        generator,
        cfg.limits.max_concurrent_provider_calls,
    ));
    let ingestor = Arc::new(Ingestor::new(
        index,
        repo.clone(),
        embedder,
        cfg.chunk_config(),
        cfg.embedding.batch_size,
    ));

    Ok(AppState {
        config: Arc::new(cfg.clone()),
        orchestrator,
        repo,
        ingestor: ingestor.clone(),
    })
}

/// One-shot question answering over local files.
async fn run_ask(
    cfg: &Config,
    question: &str,
    files: &[PathBuf],
    k: Option<usize>,
) -> anyhow::Result<()> {
    let state = build_state(cfg)?;
    let user = "cli";

    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf");
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let doc = state.repo.create(user, name).await?;
        eprintln!("Ingesting {} ...", path.display());
        let chunks = state
            .ingestor
            .ingest(&doc.id, user, bytes)
            .await
            .with_context(|| format!("failed to ingest {}", path.display()))?;
        eprintln!("  {} chunks indexed", chunks);
    }

    let request = AskRequest {
        question: question.to_string(),
        user_id: user.to_string(),
        doc_ids: None,
        k,
    };

    let mut events = state.orchestrator.ask(request)?;
    let mut citations = Vec::new();

    use std::io::Write;
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Token { content } => {
                print!("{content}");
                stdout.flush().ok();
            }
            StreamEvent::Citation { citation } => citations.push(citation),
            StreamEvent::Complete { final_response } => {
                println!();
                if !citations.is_empty() {
                    println!();
                    println!("Sources:");
                    for (i, c) in citations.iter().enumerate() {
                        println!("  [S{}] {} (page {})", i + 1, c.doc_name, c.page);
                    }
                }
                eprintln!(
                    "\n{} chunks retrieved in {} ms",
                    final_response.usage.retrieved_docs, final_response.latency_ms
                );
            }
            StreamEvent::Error { error } => {
                anyhow::bail!("answer failed: {error}");
            }
        }
    }

    Ok(())
}
