//! In-memory implementation of both store seams.
//!
//! `HashMap`s behind `std::sync::RwLock`; vector queries are brute-force
//! cosine over all visible entries. Suitable for tests and small embedded
//! corpora; the visibility semantics are identical to the SQLite
//! backend's.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embed::cosine_similarity;
use crate::error::Result;
use crate::models::{Chunk, Document, IndexEntry, SearchFilter, SearchHit};

use super::{DocumentStore, VectorIndex};

/// In-memory document store and vector index.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<HashMap<String, Chunk>>,
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn put_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut stored = self.chunks.write().unwrap();
        for c in chunks {
            stored.insert(c.id.clone(), c.clone());
        }
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().unwrap();
        Ok(docs.get(id).cloned())
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks.get(chunk_id).cloned())
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let version = {
            let docs = self.docs.read().unwrap();
            match docs.get(document_id) {
                Some(d) => d.version,
                None => return Ok(Vec::new()),
            }
        };
        let chunks = self.chunks.read().unwrap();
        let mut out: Vec<Chunk> = chunks
            .values()
            .filter(|c| c.document_id == document_id && c.version == version)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.chunk_index);
        Ok(out)
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        self.docs.write().unwrap().remove(id);
        self.chunks
            .write()
            .unwrap()
            .retain(|_, c| c.document_id != id);
        Ok(())
    }

    async fn purge_chunks_below(&self, document_id: &str, version: i64) -> Result<()> {
        self.chunks
            .write()
            .unwrap()
            .retain(|_, c| c.document_id != document_id || c.version >= version);
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MemoryStore {
    async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(entry.chunk_id.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, chunk_id: &str) -> Result<()> {
        self.entries.write().unwrap().remove(chunk_id);
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .retain(|_, e| e.document_id != document_id);
        Ok(())
    }

    async fn purge_below(&self, document_id: &str, version: i64) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .retain(|_, e| e.document_id != document_id || e.version >= version);
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        let docs = self.docs.read().unwrap();
        let entries = self.entries.read().unwrap();

        let mut hits: Vec<SearchHit> = entries
            .values()
            .filter(|e| {
                // Visible means the entry's version is the committed one.
                docs.get(&e.document_id).map(|d| d.version) == Some(e.version)
            })
            .filter(|e| filter.map_or(true, |f| f.matches(e.origin, e.posted_at)))
            .map(|e| SearchHit {
                chunk_id: e.chunk_id.clone(),
                document_id: e.document_id.clone(),
                similarity: cosine_similarity(embedding, &e.embedding.vector),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Embedding, Origin};

    fn doc(id: &str, version: i64) -> Document {
        Document {
            id: id.to_string(),
            origin: Origin::Lecture,
            title: None,
            locator: format!("https://example.edu/{}", id),
            author: None,
            posted_at: 1_700_000_000,
            ingested_at: 1_700_000_000,
            body: "body".to_string(),
            content_hash: String::new(),
            version,
        }
    }

    fn entry(chunk_id: &str, document_id: &str, version: i64, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            origin: Origin::Lecture,
            posted_at: 1_700_000_000,
            version,
            embedding: Embedding {
                vector,
                model_id: "test-model".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let store = MemoryStore::new();
        store.put_document(&doc("d1", 1)).await.unwrap();
        store
            .upsert(&entry("c1", "d1", 1, vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(&entry("c2", "d1", 1, vec![0.7, 0.7]))
            .await
            .unwrap();
        store
            .upsert(&entry("c3", "d1", 1, vec![0.0, 1.0]))
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_query_ties_break_by_chunk_id() {
        let store = MemoryStore::new();
        store.put_document(&doc("d1", 1)).await.unwrap();
        for id in ["zz", "aa", "mm"] {
            store
                .upsert(&entry(id, "d1", 1, vec![1.0, 0.0]))
                .await
                .unwrap();
        }
        let hits = store.query(&[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["aa", "mm", "zz"]);
    }

    #[tokio::test]
    async fn test_deleted_chunk_never_returned() {
        let store = MemoryStore::new();
        store.put_document(&doc("d1", 1)).await.unwrap();
        store
            .upsert(&entry("c1", "d1", 1, vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(&entry("c2", "d1", 1, vec![0.9, 0.1]))
            .await
            .unwrap();

        store.delete("c1").await.unwrap();

        let hits = store.query(&[1.0, 0.0], 10, None).await.unwrap();
        assert!(hits.iter().all(|h| h.chunk_id != "c1"));
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_applies_before_k_limit() {
        let store = MemoryStore::new();
        store.put_document(&doc("d1", 1)).await.unwrap();
        let mut forum_doc = doc("d2", 1);
        forum_doc.origin = Origin::ForumPost;
        store.put_document(&forum_doc).await.unwrap();

        // Lecture entries score higher than the forum entry.
        store
            .upsert(&entry("lec1", "d1", 1, vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(&entry("lec2", "d1", 1, vec![0.99, 0.01]))
            .await
            .unwrap();
        let mut forum_entry = entry("forum1", "d2", 1, vec![0.5, 0.5]);
        forum_entry.origin = Origin::ForumPost;
        store.upsert(&forum_entry).await.unwrap();

        let filter = SearchFilter {
            origins: Some(vec![Origin::ForumPost]),
            since: None,
        };
        // k=1 with the filter: the two better-scoring lecture entries must
        // not consume the slot.
        let hits = store.query(&[1.0, 0.0], 1, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "forum1");
    }

    #[tokio::test]
    async fn test_upsert_is_last_writer_wins() {
        let store = MemoryStore::new();
        store.put_document(&doc("d1", 1)).await.unwrap();
        store
            .upsert(&entry("c1", "d1", 1, vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(&entry("c1", "d1", 1, vec![0.0, 1.0]))
            .await
            .unwrap();

        let hits = store.query(&[0.0, 1.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_staged_version_invisible_until_commit() {
        let store = MemoryStore::new();
        store.put_document(&doc("d1", 1)).await.unwrap();
        store
            .upsert(&entry("d1@1#0000", "d1", 1, vec![1.0, 0.0]))
            .await
            .unwrap();

        // Stage version 2: new entry exists but the document still
        // commits version 1.
        store
            .upsert(&entry("d1@2#0000", "d1", 2, vec![0.0, 1.0]))
            .await
            .unwrap();

        let hits = store.query(&[0.0, 1.0], 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["d1@1#0000"], "staged entry leaked before commit");

        // Commit version 2: old generation disappears, new appears.
        store.put_document(&doc("d1", 2)).await.unwrap();
        let hits = store.query(&[0.0, 1.0], 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["d1@2#0000"]);

        // Purge drops the stale generation's entries.
        store.purge_below("d1", 2).await.unwrap();
        let entries = store.entries.read().unwrap();
        assert!(!entries.contains_key("d1@1#0000"));
        assert!(entries.contains_key("d1@2#0000"));
    }

    #[tokio::test]
    async fn test_query_never_mixes_generations() {
        let store = MemoryStore::new();
        store.put_document(&doc("d1", 1)).await.unwrap();
        for i in 0..3 {
            store
                .upsert(&entry(
                    &format!("d1@1#{:04}", i),
                    "d1",
                    1,
                    vec![1.0, i as f32 * 0.1],
                ))
                .await
                .unwrap();
        }
        for i in 0..3 {
            store
                .upsert(&entry(
                    &format!("d1@2#{:04}", i),
                    "d1",
                    2,
                    vec![1.0, i as f32 * 0.1],
                ))
                .await
                .unwrap();
        }

        // Whatever the commit state, all returned chunk ids carry the
        // same version marker.
        for committed in [1, 2] {
            store.put_document(&doc("d1", committed)).await.unwrap();
            let hits = store.query(&[1.0, 0.0], 10, None).await.unwrap();
            assert_eq!(hits.len(), 3);
            let marker = format!("@{}#", committed);
            assert!(hits.iter().all(|h| h.chunk_id.contains(&marker)));
        }
    }

    #[tokio::test]
    async fn test_remove_document_clears_entries() {
        let store = MemoryStore::new();
        store.put_document(&doc("d1", 1)).await.unwrap();
        store.put_document(&doc("d2", 1)).await.unwrap();
        store
            .upsert(&entry("c1", "d1", 1, vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(&entry("c2", "d2", 1, vec![1.0, 0.0]))
            .await
            .unwrap();

        store.remove_document("d1").await.unwrap();
        let hits = store.query(&[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c2"]);
    }

    #[tokio::test]
    async fn test_get_chunks_returns_committed_version_in_order() {
        let store = MemoryStore::new();
        store.put_document(&doc("d1", 2)).await.unwrap();
        let chunks = vec![
            Chunk {
                id: "d1@2#0001".to_string(),
                document_id: "d1".to_string(),
                chunk_index: 1,
                start: 10,
                end: 20,
                text: "second".to_string(),
                version: 2,
            },
            Chunk {
                id: "d1@2#0000".to_string(),
                document_id: "d1".to_string(),
                chunk_index: 0,
                start: 0,
                end: 10,
                text: "first".to_string(),
                version: 2,
            },
            Chunk {
                id: "d1@1#0000".to_string(),
                document_id: "d1".to_string(),
                chunk_index: 0,
                start: 0,
                end: 10,
                text: "stale".to_string(),
                version: 1,
            },
        ];
        store.put_chunks(&chunks).await.unwrap();

        let got = store.get_chunks("d1").await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].text, "first");
        assert_eq!(got[1].text, "second");
    }

    #[tokio::test]
    async fn test_query_on_empty_store_is_empty() {
        let store = MemoryStore::new();
        let hits = store.query(&[1.0, 0.0], 5, None).await.unwrap();
        assert!(hits.is_empty());
    }
}
