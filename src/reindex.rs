//! Re-embed chunks after an embedding model change.
//!
//! Vectors remember the model that produced them, and vectors from
//! different models do not share a space. `lectern reindex` finds rows
//! whose stored model id no longer matches the configured embedder (or
//! whose vector is missing outright) and regenerates them in place.

use anyhow::{anyhow, Result};
use sqlx::{Row, SqlitePool};

use lectern_core::models::{Embedding, IndexEntry, Origin};
use lectern_core::store::VectorIndex;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

struct StaleChunk {
    chunk_id: String,
    document_id: String,
    text: String,
    origin: Origin,
    posted_at: i64,
    version: i64,
}

/// Find and re-embed chunks whose vectors were produced by another model.
pub async fn run_reindex(config: &Config, dry_run: bool) -> Result<()> {
    let embedder = embedding::create_embedder(&config.embedding)?;
    let model_id = embedder.model_id().to_string();

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let stale = find_stale_chunks(&pool, &model_id).await?;

    if dry_run {
        println!("reindex (dry-run)");
        println!("  chunks needing re-embedding: {}", stale.len());
        pool.close().await;
        return Ok(());
    }

    if stale.is_empty() {
        println!("reindex");
        println!("  all vectors match model {}", model_id);
        pool.close().await;
        return Ok(());
    }

    let total = stale.len();
    let batch_size = config.embedding.batch_size.max(1);
    let mut reembedded = 0u64;
    let mut failed = 0u64;

    for batch in stale.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

        match embedder.embed_batch(&texts).await {
            Ok(vectors) => {
                for (item, vector) in batch.iter().zip(vectors) {
                    let entry = IndexEntry {
                        chunk_id: item.chunk_id.clone(),
                        document_id: item.document_id.clone(),
                        origin: item.origin,
                        posted_at: item.posted_at,
                        version: item.version,
                        embedding: Embedding {
                            vector,
                            model_id: model_id.clone(),
                        },
                    };
                    store.upsert(&entry).await?;
                    reembedded += 1;
                }
            }
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {}", e);
                failed += batch.len() as u64;
            }
        }
    }

    println!("reindex");
    println!("  model: {}", model_id);
    println!("  stale chunks: {}", total);
    println!("  re-embedded: {}", reembedded);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}

/// Visible-generation chunks with a missing vector or one from another
/// model.
async fn find_stale_chunks(pool: &SqlitePool, model_id: &str) -> Result<Vec<StaleChunk>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id AS chunk_id, c.document_id, c.text, c.version,
               d.origin, d.posted_at, d.ingested_at
        FROM chunks c
        JOIN documents d ON d.id = c.document_id AND c.version = d.version
        LEFT JOIN vectors v ON v.chunk_id = c.id
        WHERE v.chunk_id IS NULL OR v.model_id != ?
        ORDER BY c.document_id, c.chunk_index
        "#,
    )
    .bind(model_id)
    .fetch_all(pool)
    .await?;

    let mut stale = Vec::with_capacity(rows.len());
    for row in &rows {
        let origin: String = row.get("origin");
        let origin: Origin = origin.parse().map_err(|e: String| anyhow!(e))?;
        let posted_at: i64 = row.get("posted_at");
        let ingested_at: i64 = row.get("ingested_at");

        stale.push(StaleChunk {
            chunk_id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            text: row.get("text"),
            origin,
            posted_at: if posted_at > 0 { posted_at } else { ingested_at },
            version: row.get("version"),
        });
    }

    Ok(stale)
}
