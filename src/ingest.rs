//! The ingest and delete commands.
//!
//! `ingest` reads a feed file (or a single text/markdown document),
//! parses it into documents, and runs them through the retrieval
//! pipeline: chunk, embed, stage, commit, purge. Feed parse problems
//! fail the command; per-document pipeline failures are reported and
//! the rest proceed.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use lectern_core::models::Origin;
use lectern_core::store::{DocumentStore, VectorIndex};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::feed;
use crate::retriever::Retriever;
use crate::sqlite_store::SqliteStore;

/// Ingest a feed file or a single text document.
pub async fn run_ingest(config: &Config, path: &Path, origin: &str) -> Result<()> {
    let origin: Origin = origin.parse().map_err(|e: String| anyhow!(e))?;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let now = chrono::Utc::now().timestamp();

    let is_feed = path.extension().and_then(|e| e.to_str()) == Some("json");
    let parsed = if is_feed {
        feed::parse_feed(&raw, origin, &config.ingest, now)?
    } else {
        feed::ParsedFeed {
            documents: vec![feed::document_from_text(path, origin, &raw, now)],
            skipped_short: 0,
        }
    };

    if parsed.documents.is_empty() {
        println!("ingest {}", path.display());
        println!("  no documents above the minimum length");
        return Ok(());
    }

    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let embedder = embedding::create_embedder(&config.embedding)?;
    let retriever = Retriever::new(store.clone(), store, embedder, config);

    let total = parsed.documents.len();
    let outcomes = retriever.ingest_batch(parsed.documents).await;

    let mut ingested = 0usize;
    let mut chunks = 0usize;
    let mut unchanged = 0usize;
    let mut failed = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) if report.skipped_unchanged => unchanged += 1,
            Ok(report) => {
                ingested += 1;
                chunks += report.chunks;
            }
            Err(err) => {
                eprintln!("Warning: {}: {}", outcome.document_id, err);
                failed += 1;
            }
        }
    }

    println!("ingest {}", path.display());
    println!("  documents: {}", total);
    println!("  ingested: {} ({} chunks)", ingested, chunks);
    if unchanged > 0 {
        println!("  unchanged: {}", unchanged);
    }
    if parsed.skipped_short > 0 {
        println!("  skipped (too short): {}", parsed.skipped_short);
    }
    if failed > 0 {
        println!("  failed: {}", failed);
    }

    pool.close().await;
    Ok(())
}

/// Remove one document and its index entries.
///
/// Works directly on the store rather than through [`Retriever`] so
/// deletion never needs embedding credentials. Index entries go first,
/// same ordering as the pipeline's delete.
pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let existing = store.get_document(id).await?;
    let Some(doc) = existing else {
        println!("Document not found: {}", id);
        pool.close().await;
        return Ok(());
    };

    store.remove_document(id).await?;
    store.delete_document(id).await?;

    println!("Deleted {} ({}, {}).", id, doc.origin, doc.locator);

    pool.close().await;
    Ok(())
}
