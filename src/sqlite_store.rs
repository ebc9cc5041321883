//! SQLite-backed [`DocumentStore`] and [`VectorIndex`] implementation.
//!
//! Both seams live on one [`SqlitePool`] over the schema created by
//! [`crate::migrate`]. Version visibility is enforced in SQL: reads of
//! chunks and vectors join `documents` on `version = documents.version`,
//! so staged generations stay invisible until `put_document` flips the
//! document row.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use lectern_core::embed::{blob_to_vec, cosine_similarity, vec_to_blob};
use lectern_core::error::{Result, RetrieveError};
use lectern_core::models::{Chunk, Document, IndexEntry, Origin, SearchFilter, SearchHit};
use lectern_core::store::{DocumentStore, VectorIndex};

/// SQLite implementation of both storage traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn db_err(err: sqlx::Error) -> RetrieveError {
    RetrieveError::IndexUnavailable(err.to_string())
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let origin: String = row.get("origin");
    let origin: Origin = origin.parse().map_err(RetrieveError::IndexUnavailable)?;
    Ok(Document {
        id: row.get("id"),
        origin,
        title: row.get("title"),
        locator: row.get("locator"),
        author: row.get("author"),
        posted_at: row.get("posted_at"),
        ingested_at: row.get("ingested_at"),
        body: row.get("body"),
        content_hash: row.get("content_hash"),
        version: row.get("version"),
    })
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let start: i64 = row.get("start_offset");
    let end: i64 = row.get("end_offset");
    Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        start: start as usize,
        end: end as usize,
        text: row.get("text"),
        version: row.get("version"),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn put_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, origin, title, locator, author,
                                   posted_at, ingested_at, body, content_hash, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                origin = excluded.origin,
                title = excluded.title,
                locator = excluded.locator,
                author = excluded.author,
                posted_at = excluded.posted_at,
                ingested_at = excluded.ingested_at,
                body = excluded.body,
                content_hash = excluded.content_hash,
                version = excluded.version
            "#,
        )
        .bind(&doc.id)
        .bind(doc.origin.as_str())
        .bind(&doc.title)
        .bind(&doc.locator)
        .bind(&doc.author)
        .bind(doc.posted_at)
        .bind(doc.ingested_at)
        .bind(&doc.body)
        .bind(&doc.content_hash)
        .bind(doc.version)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn put_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index,
                                    start_offset, end_offset, text, version)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    chunk_index = excluded.chunk_index,
                    start_offset = excluded.start_offset,
                    end_offset = excluded.end_offset,
                    text = excluded.text
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(chunk.start as i64)
            .bind(chunk.end as i64)
            .bind(&chunk.text)
            .bind(chunk.version)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, origin, title, locator, author, posted_at, ingested_at, body, content_hash, version FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => Ok(Some(row_to_document(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query(
            "SELECT id, document_id, chunk_index, start_offset, end_offset, text, version FROM chunks WHERE id = ?",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| row_to_chunk(&r)))
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index,
                   c.start_offset, c.end_offset, c.text, c.version
            FROM chunks c
            JOIN documents d ON d.id = c.document_id AND c.version = d.version
            WHERE c.document_id = ?
            ORDER BY c.chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn purge_chunks_below(&self, document_id: &str, version: i64) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE document_id = ? AND version < ?")
            .bind(document_id)
            .bind(version)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        let blob = vec_to_blob(&entry.embedding.vector);
        let dims = entry.embedding.vector.len() as i64;

        sqlx::query(
            r#"
            INSERT INTO vectors (chunk_id, document_id, origin, posted_at,
                                 version, model_id, dims, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                origin = excluded.origin,
                posted_at = excluded.posted_at,
                version = excluded.version,
                model_id = excluded.model_id,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(&entry.chunk_id)
        .bind(&entry.document_id)
        .bind(entry.origin.as_str())
        .bind(entry.posted_at)
        .bind(entry.version)
        .bind(&entry.embedding.model_id)
        .bind(dims)
        .bind(&blob)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn delete(&self, chunk_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM vectors WHERE chunk_id = ?")
            .bind(chunk_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn purge_below(&self, document_id: &str, version: i64) -> Result<()> {
        sqlx::query("DELETE FROM vectors WHERE document_id = ? AND version < ?")
            .bind(document_id)
            .bind(version)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        // An explicit empty origin list matches nothing.
        if let Some(f) = filter {
            if let Some(ref origins) = f.origins {
                if origins.is_empty() {
                    return Ok(Vec::new());
                }
            }
        }

        let mut sql = String::from(
            "SELECT v.chunk_id, v.document_id, v.embedding \
             FROM vectors v \
             JOIN documents d ON d.id = v.document_id AND v.version = d.version",
        );
        let mut clauses: Vec<String> = Vec::new();
        if let Some(f) = filter {
            if let Some(ref origins) = f.origins {
                let placeholders = vec!["?"; origins.len()].join(", ");
                clauses.push(format!("v.origin IN ({})", placeholders));
            }
            if f.since.is_some() {
                clauses.push("v.posted_at >= ?".to_string());
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut query = sqlx::query(&sql);
        if let Some(f) = filter {
            if let Some(ref origins) = f.origins {
                for origin in origins {
                    query = query.bind(origin.as_str());
                }
            }
            if let Some(since) = f.since {
                query = query.bind(since);
            }
        }

        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                SearchHit {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    similarity: cosine_similarity(embedding, &vector),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);

        Ok(hits)
    }
}
