//! Storage abstraction for lectern.
//!
//! Two seams: [`DocumentStore`] holds documents and their chunk records,
//! [`VectorIndex`] holds embeddings and answers nearest-neighbor queries.
//! The SQLite backend in the application crate implements both on one
//! pool; [`memory::MemoryStore`] implements both for tests and embedded
//! use.
//!
//! # Version visibility
//!
//! Re-ingesting a document must never let a concurrent query see a mix of
//! old and new chunks. Both seams cooperate on a version-stamp protocol
//! instead of locking:
//!
//! 1. chunks and index entries for the new generation are written first,
//!    stamped with the new version. They stay invisible, because an entry
//!    is only visible while its version equals its document's committed
//!    version;
//! 2. [`DocumentStore::put_document`] writes the document with the new
//!    version, one atomic write that flips the whole generation visible;
//! 3. entries below the committed version are purged.
//!
//! Chunk ids embed the version, so the generations never collide and a
//! stale hit can never hydrate into new-generation text.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, Document, IndexEntry, SearchFilter, SearchHit};

/// Durable holder of documents and chunk records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace the document record. This is the visibility
    /// commit: index entries and chunks stamped with `doc.version`
    /// become the document's visible generation.
    async fn put_document(&self, doc: &Document) -> Result<()>;

    /// Stage chunk records. Chunks carry their own document id and
    /// version; staging does not affect visibility.
    async fn put_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Fetch a document by id, if present.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Fetch a single chunk record by chunk id.
    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>>;

    /// Chunk records at the document's committed version, ordered by
    /// chunk index.
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Remove a document and all its chunk records.
    async fn delete_document(&self, id: &str) -> Result<()>;

    /// Drop chunk records of this document older than `version`.
    async fn purge_chunks_below(&self, document_id: &str, version: i64) -> Result<()>;
}

/// Vector index over chunk embeddings.
///
/// Cosine similarity is the metric at both population and query time.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the entry for a chunk id. Atomic per chunk id;
    /// concurrent upserts of one id resolve last-writer-wins by arrival
    /// order.
    async fn upsert(&self, entry: &IndexEntry) -> Result<()>;

    /// Remove one entry. Synchronous: once this returns, no query
    /// returns the id.
    async fn delete(&self, chunk_id: &str) -> Result<()>;

    /// Remove every entry belonging to a document.
    async fn remove_document(&self, document_id: &str) -> Result<()>;

    /// Drop entries of this document older than `version`.
    async fn purge_below(&self, document_id: &str, version: i64) -> Result<()>;

    /// k-nearest-neighbor query over visible entries.
    ///
    /// Returns at most `k` hits ordered by descending similarity, ties
    /// broken by ascending chunk id. The filter applies before the
    /// k-limit: a filtered-out entry never counts against `k`.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>>;
}
