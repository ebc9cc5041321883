//! # Lectern CLI (`lectern`)
//!
//! The `lectern` binary is the primary interface for Lectern. It provides
//! commands for database initialization, feed ingestion, retrieval,
//! question answering, and index maintenance.
//!
//! ## Usage
//!
//! ```bash
//! lectern --config ./config/lectern.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lectern init` | Create the SQLite database and run schema migrations |
//! | `lectern ingest <file>` | Ingest a feed file or a single text document |
//! | `lectern query "<question>"` | Retrieve context and citations |
//! | `lectern ask "<question>"` | Retrieve, then answer through the configured model |
//! | `lectern delete <id>` | Remove a document and its index entries |
//! | `lectern reindex` | Re-embed vectors left behind by a model change |
//! | `lectern status` | Document/chunk/vector counts by origin |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! lectern init --config ./config/lectern.toml
//!
//! # Ingest a course-material feed
//! lectern ingest pages.json --origin lecture
//!
//! # Ingest a forum export (topics always land as forum-post)
//! lectern ingest topics.json
//!
//! # Retrieval only
//! lectern query "which loss function for logistic regression?"
//!
//! # Retrieval restricted to the forum, then an answer
//! lectern ask "when is GA5 due?" --origin forum-post
//! ```

mod answer;
mod config;
mod db;
mod embedding;
mod feed;
mod ingest;
mod migrate;
mod query;
mod reindex;
mod retriever;
mod sqlite_store;
mod status;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Lectern CLI: a retrieval-and-citation pipeline for a course teaching
/// assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lectern.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lectern",
    about = "Lectern — retrieval and citations over course material for a teaching assistant",
    version,
    long_about = "Lectern ingests course material (lecture notes, slides, forum exports, \
    attachments), chunks and embeds it into a SQLite-backed vector index, and answers student \
    questions by retrieving relevant chunks, ranking them, and assembling cited context."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/lectern.toml`. Database, chunking, retrieval,
    /// ranking, embedding, and answerer settings are read from this file.
    #[arg(long, global = true, default_value = "./config/lectern.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, vectors). This command is idempotent;
    /// running it multiple times is safe.
    Init,

    /// Ingest a feed file or a single text/markdown document.
    ///
    /// JSON files are treated as scraper feeds: a `pages` array ingests
    /// as course material under the given origin, a `topics` array as
    /// forum posts (one document per topic). Any other file ingests as
    /// a single document whose locator is the path.
    Ingest {
        /// Path to the feed or document file.
        file: PathBuf,

        /// Origin for page records and plain documents:
        /// `lecture`, `slide`, `forum-post`, or `attachment`.
        #[arg(long, default_value = "lecture")]
        origin: String,
    },

    /// Retrieve context and citations for a question.
    ///
    /// Embeds the question, searches the vector index, ranks candidates
    /// by similarity, term overlap, and recency, and prints the
    /// assembled context block with its source citations. Never calls
    /// the answerer.
    Query {
        /// The question text.
        question: String,

        /// Restrict to these origins (repeatable or comma-separated).
        #[arg(long = "origin", value_delimiter = ',')]
        origins: Vec<String>,

        /// Only consider documents posted on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// How many ranked chunks feed the context and citations.
        #[arg(long)]
        top_n: Option<usize>,

        /// Print the outcome as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question over retrieved course context.
    ///
    /// Runs the same retrieval as `query`, then asks the configured
    /// chat model to answer from that context alone. When retrieval
    /// finds nothing relevant, prints a fixed fallback without calling
    /// the model.
    Ask {
        /// The question text.
        question: String,

        /// Restrict to these origins (repeatable or comma-separated).
        #[arg(long = "origin", value_delimiter = ',')]
        origins: Vec<String>,

        /// Only consider documents posted on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,
    },

    /// Remove a document and its index entries.
    Delete {
        /// Document id.
        id: String,
    },

    /// Re-embed chunks whose vectors came from another model.
    ///
    /// After changing `embedding.model` (or provider), stored vectors no
    /// longer match the configured embedder. This finds them and
    /// regenerates them in place.
    Reindex {
        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show document, chunk, and vector counts by origin.
    Status,
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
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file, origin } => {
            ingest::run_ingest(&cfg, &file, &origin).await?;
        }
        Commands::Query {
            question,
            origins,
            since,
            top_n,
            json,
        } => {
            query::run_query(&cfg, &question, &origins, since, top_n, json).await?;
        }
        Commands::Ask {
            question,
            origins,
            since,
        } => {
            query::run_ask(&cfg, &question, &origins, since).await?;
        }
        Commands::Delete { id } => {
            ingest::run_delete(&cfg, &id).await?;
        }
        Commands::Reindex { dry_run } => {
            reindex::run_reindex(&cfg, dry_run).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
    }

    Ok(())
}
