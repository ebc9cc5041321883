use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Documents. `version` is the committed version stamp: chunk and
    // vector rows are only visible while their version matches it.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            origin TEXT NOT NULL,
            title TEXT,
            locator TEXT NOT NULL,
            author TEXT,
            posted_at INTEGER NOT NULL,
            ingested_at INTEGER NOT NULL,
            body TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            version INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Chunk records. Ids embed document id, version, and index, so two
    // generations of one document coexist without collisions.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            version INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Vector index entries: one embedding per chunk plus the metadata
    // needed for pre-k filtering without touching the chunks table.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            origin TEXT NOT NULL,
            posted_at INTEGER NOT NULL,
            version INTEGER NOT NULL,
            model_id TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_document_id ON vectors(document_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_origin ON documents(origin)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_locator ON documents(locator)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
