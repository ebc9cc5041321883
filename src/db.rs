//! Database connection.
//!
//! One [`SqlitePool`] serves both store seams: documents, chunks, and
//! vectors live in the same SQLite file, and [`crate::sqlite_store`]
//! implements both traits over it. The pool is sized for the ingest
//! path — one writer per concurrently-ingested document plus headroom
//! for query readers.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

/// Connections kept available to query readers while a batch ingest
/// holds the writer connections.
const READER_HEADROOM: u32 = 2;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // `lectern init` may be the first command ever run; the data
    // directory might not exist yet.
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(pool_size(config))
        .connect_with(options)
        .await?;

    Ok(pool)
}

fn pool_size(config: &Config) -> u32 {
    config.ingest.max_concurrency.max(1) as u32 + READER_HEADROOM
}
