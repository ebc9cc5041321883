//! Index overview.
//!
//! Summarizes what is searchable: document, chunk, and vector counts with a
//! per-origin breakdown. Used by `lectern status` to confirm that ingests
//! landed and embeddings cover the corpus.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-origin breakdown of the visible generation.
struct OriginStats {
    origin: String,
    doc_count: i64,
    chunk_count: i64,
    vector_count: i64,
    last_ingest_ts: i64,
}

/// Run the status command: query the database and print a summary.
///
/// Counts cover the visible generation only, so rows staged by an
/// interrupted ingest do not inflate them.
pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM chunks c \
         JOIN documents d ON d.id = c.document_id AND c.version = d.version",
    )
    .fetch_one(&pool)
    .await?;

    let total_vectors: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM vectors v \
         JOIN documents d ON d.id = v.document_id AND v.version = d.version",
    )
    .fetch_one(&pool)
    .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Lectern — Index Status");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Vectors:     {} / {} ({}%)",
        total_vectors,
        total_chunks,
        if total_chunks > 0 {
            (total_vectors * 100) / total_chunks
        } else {
            0
        }
    );

    let origin_rows = sqlx::query(
        r#"
        SELECT
            d.origin,
            COUNT(DISTINCT d.id) AS doc_count,
            COUNT(DISTINCT c.id) AS chunk_count,
            COUNT(DISTINCT v.chunk_id) AS vector_count,
            MAX(d.ingested_at) AS last_ingest
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id AND c.version = d.version
        LEFT JOIN vectors v ON v.document_id = d.id AND v.version = d.version
        GROUP BY d.origin
        ORDER BY doc_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let origin_stats: Vec<OriginStats> = origin_rows
        .iter()
        .map(|row| OriginStats {
            origin: row.get("origin"),
            doc_count: row.get("doc_count"),
            chunk_count: row.get("chunk_count"),
            vector_count: row.get("vector_count"),
            last_ingest_ts: row.get("last_ingest"),
        })
        .collect();

    if !origin_stats.is_empty() {
        println!();
        println!("  By origin:");
        println!(
            "  {:<16} {:>6} {:>8} {:>8}   {}",
            "ORIGIN", "DOCS", "CHUNKS", "VECTORS", "LAST INGEST"
        );
        println!("  {}", "-".repeat(64));

        for s in &origin_stats {
            println!(
                "  {:<16} {:>6} {:>8} {:>8}   {}",
                s.origin,
                s.doc_count,
                s.chunk_count,
                s.vector_count,
                format_ts_relative(s.last_ingest_ts)
            );
        }
    }

    // Distinct embedding models, so drift from the configured model (and a
    // pending reindex) is visible at a glance.
    let model_rows =
        sqlx::query("SELECT model_id, COUNT(*) AS n FROM vectors GROUP BY model_id ORDER BY n DESC")
            .fetch_all(&pool)
            .await?;

    if !model_rows.is_empty() {
        println!();
        println!("  By model:");
        for row in &model_rows {
            let model_id: String = row.get("model_id");
            let n: i64 = row.get("n");
            println!("  {:<32} {:>8}", model_id, n);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    match delta {
        0..=59 => "just now".to_string(),
        60..=3599 => {
            let mins = delta / 60;
            format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
        }
        3600..=86399 => {
            let hours = delta / 3600;
            format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
        }
        86400..=2591999 => {
            let days = delta / 86400;
            format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
        }
        _ => format_ts_iso(ts),
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
