//! # docqa CLI (`dqa`)
//!
//! The `dqa` binary is the interface to docqa. One entry point rebuilds the
//! index from the documents directory; the others answer questions against
//! it.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dqa ingest` | (Re)build the index from the documents directory |
//! | `dqa ask "<question>"` | Answer one question and print citations |
//! | `dqa chat` | Interactive question-answering session |
//! | `dqa stats` | Show what's indexed |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index from ./data
//! dqa ingest
//!
//! # Preview document and chunk counts without embedding anything
//! dqa ingest --dry-run
//!
//! # One-shot question
//! dqa ask "What is reinforcement learning from human feedback?"
//!
//! # Interactive session
//! dqa chat --config ./config/docqa.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docqa::chain::QaChain;
use docqa::{config, ingest, session, stats};

/// Chat with a local collection of PDF documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; when the file does not exist, built-in defaults are used
/// (documents in `./data`, index in `./vectorstore`).
#[derive(Parser)]
#[command(
    name = "dqa",
    about = "docqa — a local question-answering assistant over PDF documents",
    version,
    long_about = "docqa ingests a directory of PDF documents into a persisted similarity \
    index and answers natural-language questions against it with a locally running language \
    model, grounding every answer in the retrieved text and citing source files and pages."
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
    /// (Re)build the index from the documents directory.
    ///
    /// Loads every PDF, splits pages into overlapping chunks, embeds them,
    /// and atomically replaces the persisted index. Fails without writing
    /// anything if the directory is missing, empty, or any document cannot
    /// be parsed.
    Ingest {
        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a single question and print the answer with citations.
    ///
    /// Requires an existing index; run `dqa ingest` first.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Start an interactive question-answering session.
    ///
    /// One question per line; the transcript of the session is shown as it
    /// grows, and failed turns are reported rather than dropped.
    Chat,

    /// Show an overview of the persisted index.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Ingest { dry_run } => {
            ingest::run_ingest(&config, dry_run).await?;
        }
        Commands::Ask { question } => {
            let chain = QaChain::build(&config).await?;
            session::run_ask(&chain, &question).await?;
        }
        Commands::Chat => {
            let chain = QaChain::build(&config).await?;
            session::run_chat(&chain).await?;
        }
        Commands::Stats => {
            stats::run_stats(&config)?;
        }
    }

    Ok(())
}
