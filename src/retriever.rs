//! The retrieval orchestrator.
//!
//! [`Retriever`] ties the seams together: documents come in through
//! [`ingest`](Retriever::ingest) (chunk, embed, index, commit), questions
//! come in through [`query`](Retriever::query) (embed, search, rank,
//! assemble). Each query walks the stage sequence embedding → searching →
//! ranking → assembling; a failure carries the stage it happened in via
//! [`QueryError`].
//!
//! The orchestrator owns all time and retry policy. Embedder and index
//! calls are wrapped in a per-call deadline (`retrieval.timeout_secs`)
//! and retryable failures are re-attempted with exponential backoff
//! (`retrieval.retry_attempts`, `retrieval.retry_base_delay_ms`).
//! Providers themselves make a single attempt.
//!
//! Re-ingesting an existing document stages the new generation under a
//! bumped version stamp, commits it with one document write, then purges
//! the old generation. A concurrent query sees either the old or the new
//! generation, never a mix.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use lectern_core::chunker::{chunk, ChunkPolicy};
use lectern_core::cite;
use lectern_core::embed::Embedder;
use lectern_core::error::{QueryError, RetrieveError, Stage};
use lectern_core::models::{
    Candidate, Chunk, Document, Embedding, IndexEntry, QueryOutcome, SearchFilter, SearchHit,
};
use lectern_core::rank;
use lectern_core::store::{DocumentStore, VectorIndex};

use crate::config::{Config, RankingConfig, RetrievalConfig};

/// Result of ingesting one document.
#[derive(Debug)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks: usize,
    /// True when the stored content hash matched and nothing was done.
    pub skipped_unchanged: bool,
}

/// Per-document outcome of a batch ingest. Outcomes keep the input order.
#[derive(Debug)]
pub struct IngestOutcome {
    pub document_id: String,
    pub result: Result<IngestReport, RetrieveError>,
}

/// Orchestrates ingestion and retrieval over the storage and embedding
/// seams. Cheap to clone; clones share the underlying stores.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    policy: ChunkPolicy,
    retrieval: RetrievalConfig,
    ranking: RankingConfig,
    batch_size: usize,
    ingest_concurrency: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            policy: config.chunking.policy(),
            retrieval: config.retrieval.clone(),
            ranking: config.ranking.clone(),
            batch_size: config.embedding.batch_size.max(1),
            ingest_concurrency: config.ingest.max_concurrency.max(1),
        }
    }

    /// Ingest one document: chunk, embed, stage, commit, purge.
    ///
    /// Re-ingesting an id replaces the stored content under a bumped
    /// version. When the content hash matches the stored document the
    /// call is a no-op and the report says so.
    pub async fn ingest(&self, doc: Document) -> Result<IngestReport, RetrieveError> {
        let existing = self.store.get_document(&doc.id).await?;

        if let Some(prev) = &existing {
            if !doc.content_hash.is_empty() && prev.content_hash == doc.content_hash {
                debug!(document_id = %doc.id, "content unchanged, skipping");
                return Ok(IngestReport {
                    document_id: doc.id,
                    chunks: 0,
                    skipped_unchanged: true,
                });
            }
        }

        let mut doc = doc;
        doc.version = existing.map(|d| d.version + 1).unwrap_or(1);

        let chunks: Vec<Chunk> = chunk(&doc, &self.policy)?.collect();

        // Undated documents filter and rank by their ingestion time.
        let posted_at = if doc.posted_at > 0 {
            doc.posted_at
        } else {
            doc.ingested_at
        };

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .with_retries(|| {
                    self.timed(
                        self.embedder.embed_batch(&texts),
                        RetrieveError::EmbeddingUnavailable,
                    )
                })
                .await?;

            for (chunk, vector) in batch.iter().zip(vectors) {
                entries.push(IndexEntry {
                    chunk_id: chunk.id.clone(),
                    document_id: chunk.document_id.clone(),
                    origin: doc.origin,
                    posted_at,
                    version: doc.version,
                    embedding: Embedding {
                        vector,
                        model_id: self.embedder.model_id().to_string(),
                    },
                });
            }
        }

        // Stage the new generation. Invisible until the document commits.
        self.with_retries(|| {
            self.timed(
                self.store.put_chunks(&chunks),
                RetrieveError::IndexUnavailable,
            )
        })
        .await?;
        for entry in &entries {
            self.with_retries(|| {
                self.timed(self.index.upsert(entry), RetrieveError::IndexUnavailable)
            })
            .await?;
        }

        // Commit: one write flips the visible generation.
        self.with_retries(|| {
            self.timed(
                self.store.put_document(&doc),
                RetrieveError::IndexUnavailable,
            )
        })
        .await?;

        // Drop the old generation.
        self.index.purge_below(&doc.id, doc.version).await?;
        self.store.purge_chunks_below(&doc.id, doc.version).await?;

        info!(
            document_id = %doc.id,
            chunks = chunks.len(),
            version = doc.version,
            "ingested document"
        );
        Ok(IngestReport {
            document_id: doc.id,
            chunks: chunks.len(),
            skipped_unchanged: false,
        })
    }

    /// Ingest documents in parallel, bounded by `ingest.max_concurrency`.
    ///
    /// One document's failure never aborts the others; every document
    /// gets an outcome, in input order.
    pub async fn ingest_batch(&self, docs: Vec<Document>) -> Vec<IngestOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.ingest_concurrency));
        let mut handles = Vec::with_capacity(docs.len());

        for doc in docs {
            let retriever = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let document_id = doc.id.clone();
            let handle = tokio::spawn(async move {
                let document_id = doc.id.clone();
                let result = match semaphore.acquire().await {
                    Ok(_permit) => retriever.ingest(doc).await,
                    Err(err) => Err(RetrieveError::IndexUnavailable(format!(
                        "ingest semaphore closed: {}",
                        err
                    ))),
                };
                IngestOutcome {
                    document_id,
                    result,
                }
            });
            handles.push((document_id, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (document_id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => IngestOutcome {
                    document_id,
                    result: Err(RetrieveError::IndexUnavailable(format!(
                        "ingest task failed: {}",
                        err
                    ))),
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Run the retrieval pipeline for a question.
    ///
    /// Zero candidates is a successful `found: false` outcome, not an
    /// error. Callers supply a non-empty question; the filter restricts
    /// by origin and minimum posted time before the k-limit applies.
    pub async fn query(
        &self,
        question: &str,
        filter: Option<SearchFilter>,
    ) -> Result<QueryOutcome, QueryError> {
        debug!(question_len = question.len(), "query received, embedding");
        let texts = vec![question.to_string()];
        let vectors = self
            .with_retries(|| {
                self.timed(
                    self.embedder.embed_batch(&texts),
                    RetrieveError::EmbeddingUnavailable,
                )
            })
            .await
            .map_err(|e| QueryError::new(Stage::Embedding, e))?;
        let embedding = vectors.into_iter().next().ok_or_else(|| {
            QueryError::new(
                Stage::Embedding,
                RetrieveError::EmbeddingUnavailable("embedder returned no vector".into()),
            )
        })?;

        debug!(k = self.retrieval.candidate_k, "searching index");
        let hits = self
            .with_retries(|| {
                self.timed(
                    self.index
                        .query(&embedding, self.retrieval.candidate_k, filter.as_ref()),
                    RetrieveError::IndexUnavailable,
                )
            })
            .await
            .map_err(|e| QueryError::new(Stage::Searching, e))?;

        if hits.is_empty() {
            debug!("no candidates, returning not-found outcome");
            return Ok(QueryOutcome::not_found());
        }

        let candidates = self
            .hydrate(&hits)
            .await
            .map_err(|e| QueryError::new(Stage::Searching, e))?;
        if candidates.is_empty() {
            debug!("all hits were stale, returning not-found outcome");
            return Ok(QueryOutcome::not_found());
        }

        debug!(candidates = candidates.len(), "ranking");
        let now = chrono::Utc::now().timestamp();
        let params = self.ranking.params(now);
        let ranked = rank::rank(question, candidates, &params);

        debug!(top_n = self.retrieval.top_n, "assembling context");
        let (context, citations) = cite::assemble(&ranked, self.retrieval.top_n);

        debug!(citations = citations.len(), "query completed");
        Ok(QueryOutcome {
            found: true,
            context,
            citations,
        })
    }

    /// Remove a document everywhere. Index entries go first so a query
    /// racing the delete cannot return ids it can no longer hydrate.
    pub async fn delete(&self, document_id: &str) -> Result<(), RetrieveError> {
        self.with_retries(|| {
            self.timed(
                self.index.remove_document(document_id),
                RetrieveError::IndexUnavailable,
            )
        })
        .await?;
        self.store.delete_document(document_id).await?;
        info!(document_id, "deleted document");
        Ok(())
    }

    /// Attach chunk text and document metadata to raw hits. Hits whose
    /// chunk or document has disappeared, or whose version no longer
    /// matches the committed document, are dropped rather than served
    /// stale.
    async fn hydrate(&self, hits: &[SearchHit]) -> Result<Vec<Candidate>, RetrieveError> {
        let mut documents: HashMap<String, Document> = HashMap::new();
        let mut candidates = Vec::with_capacity(hits.len());

        for hit in hits {
            let chunk = match self.store.get_chunk(&hit.chunk_id).await? {
                Some(chunk) => chunk,
                None => {
                    debug!(chunk_id = %hit.chunk_id, "hit without chunk record, dropping");
                    continue;
                }
            };

            if !documents.contains_key(&hit.document_id) {
                match self.store.get_document(&hit.document_id).await? {
                    Some(doc) => {
                        documents.insert(hit.document_id.clone(), doc);
                    }
                    None => {
                        debug!(document_id = %hit.document_id, "hit without document, dropping");
                        continue;
                    }
                }
            }
            let doc = &documents[&hit.document_id];

            if chunk.version != doc.version {
                debug!(chunk_id = %hit.chunk_id, "hit from stale generation, dropping");
                continue;
            }

            let posted_at = if doc.posted_at > 0 {
                doc.posted_at
            } else {
                doc.ingested_at
            };

            candidates.push(Candidate {
                chunk_id: chunk.id,
                document_id: chunk.document_id,
                origin: doc.origin,
                title: doc.title.clone(),
                locator: doc.locator.clone(),
                posted_at,
                similarity: hit.similarity,
                text: chunk.text,
                start: chunk.start,
                end: chunk.end,
            });
        }

        Ok(candidates)
    }

    /// Bound a future with the per-call deadline. A timeout becomes the
    /// retryable error built by `on_timeout`.
    async fn timed<T, F>(
        &self,
        fut: F,
        on_timeout: fn(String) -> RetrieveError,
    ) -> Result<T, RetrieveError>
    where
        F: Future<Output = Result<T, RetrieveError>>,
    {
        let limit = Duration::from_secs(self.retrieval.timeout_secs);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(format!(
                "call timed out after {}s",
                limit.as_secs()
            ))),
        }
    }

    /// Run `op` up to `retry_attempts` times, backing off exponentially
    /// between attempts. Non-retryable errors surface immediately.
    async fn with_retries<T, F, Fut>(&self, mut op: F) -> Result<T, RetrieveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RetrieveError>>,
    {
        let attempts = self.retrieval.retry_attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let exp = (attempt - 2).min(5);
                let delay = Duration::from_millis(self.retrieval.retry_base_delay_ms << exp);
                tokio::time::sleep(delay).await;
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    warn!(attempt, error = %err, "retryable failure");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err
            .unwrap_or_else(|| RetrieveError::IndexUnavailable("no attempt was made".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sha2::{Digest, Sha256};

    use lectern_core::models::Origin;
    use lectern_core::store::memory::MemoryStore;

    use crate::config::DbConfig;
    use crate::embedding::HashEmbedder;

    fn test_config() -> Config {
        Config {
            db: DbConfig {
                path: PathBuf::from("unused.db"),
            },
            chunking: Default::default(),
            retrieval: RetrievalConfig {
                retry_base_delay_ms: 1,
                ..Default::default()
            },
            ranking: Default::default(),
            ingest: Default::default(),
            embedding: Default::default(),
            answerer: Default::default(),
        }
    }

    fn doc(id: &str, origin: Origin, body: &str) -> Document {
        let now = chrono::Utc::now().timestamp();
        Document {
            id: id.to_string(),
            origin,
            title: Some(format!("Title of {}", id)),
            locator: format!("https://course.example/{}", id),
            author: None,
            posted_at: now - 3600,
            ingested_at: now,
            body: body.to_string(),
            content_hash: format!("{:x}", Sha256::digest(body.as_bytes())),
            version: 0,
        }
    }

    fn retriever_over(
        store: &Arc<MemoryStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Retriever {
        Retriever::new(store.clone(), store.clone(), embedder, &test_config())
    }

    struct FlakyEmbedder {
        inner: HashEmbedder,
        failures_left: Mutex<u32>,
        calls: AtomicUsize,
    }

    impl FlakyEmbedder {
        fn new(failures: u32) -> Self {
            Self {
                inner: HashEmbedder::new(64),
                failures_left: Mutex::new(failures),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, RetrieveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(RetrieveError::EmbeddingUnavailable(
                        "synthetic outage".into(),
                    ));
                }
            }
            self.inner.embed_batch(texts).await
        }
    }

    struct RejectingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for RejectingEmbedder {
        fn model_id(&self) -> &str {
            "rejector"
        }

        fn dimensions(&self) -> usize {
            8
        }

        async fn embed_batch(
            &self,
            _texts: &[String],
        ) -> Result<Vec<Vec<f32>>, RetrieveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RetrieveError::EmbeddingRejected("synthetic rejection".into()))
        }
    }

    #[tokio::test]
    async fn test_ingest_then_query_ranks_term_overlap() {
        let store = Arc::new(MemoryStore::new());
        let retriever = retriever_over(&store, Arc::new(HashEmbedder::new(256)));

        retriever
            .ingest(doc(
                "lecture-2",
                Origin::Lecture,
                "Linear regression minimizes squared error.",
            ))
            .await
            .unwrap();
        retriever
            .ingest(doc(
                "topic-9",
                Origin::ForumPost,
                "Use gradient descent for logistic regression, not squared error.",
            ))
            .await
            .unwrap();

        let outcome = retriever
            .query("what loss function for logistic regression", None)
            .await
            .unwrap();

        assert!(outcome.found);
        assert_eq!(outcome.citations.len(), 2);
        assert_eq!(outcome.citations[0].document_id, "topic-9");
        assert!(outcome.context.contains("logistic regression"));
    }

    #[tokio::test]
    async fn test_query_empty_index_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let retriever = retriever_over(&store, Arc::new(HashEmbedder::new(64)));

        let outcome = retriever.query("anything at all", None).await.unwrap();
        assert!(!outcome.found);
        assert!(outcome.context.is_empty());
        assert!(outcome.citations.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_blank_document_fails() {
        let store = Arc::new(MemoryStore::new());
        let retriever = retriever_over(&store, Arc::new(HashEmbedder::new(64)));

        let err = retriever
            .ingest(doc("empty-1", Origin::Lecture, "   \n\t  "))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrieveError::EmptyDocument(_)));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures_and_keeps_order() {
        let store = Arc::new(MemoryStore::new());
        let retriever = retriever_over(&store, Arc::new(HashEmbedder::new(64)));

        let outcomes = retriever
            .ingest_batch(vec![
                doc("good-1", Origin::Lecture, "Entropy measures expected surprise."),
                doc("bad-1", Origin::Lecture, "   "),
                doc("good-2", Origin::ForumPost, "Cross entropy compares two distributions."),
            ])
            .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].document_id, "good-1");
        assert!(outcomes[0].result.is_ok());
        assert_eq!(outcomes[1].document_id, "bad-1");
        assert!(outcomes[1].result.is_err());
        assert_eq!(outcomes[2].document_id, "good-2");
        assert!(outcomes[2].result.is_ok());
    }

    #[tokio::test]
    async fn test_batch_under_contention_completes_every_document() {
        let store = Arc::new(MemoryStore::new());
        let mut config = test_config();
        config.ingest.max_concurrency = 1;
        let retriever = Retriever::new(
            store.clone(),
            store.clone(),
            Arc::new(HashEmbedder::new(64)),
            &config,
        );

        // More documents than permits: every task waits on the semaphore
        // and every one must still produce an Ok outcome.
        let docs: Vec<Document> = (0..4)
            .map(|i| {
                doc(
                    &format!("queued-{}", i),
                    Origin::Lecture,
                    "Bias and variance trade off against model complexity.",
                )
            })
            .collect();
        let outcomes = retriever.ingest_batch(docs).await;

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }

    #[tokio::test]
    async fn test_reingest_replaces_content() {
        let store = Arc::new(MemoryStore::new());
        let retriever = retriever_over(&store, Arc::new(HashEmbedder::new(256)));

        retriever
            .ingest(doc(
                "notes-1",
                Origin::Lecture,
                "The perceptron update rule adds the misclassified example.",
            ))
            .await
            .unwrap();

        let report = retriever
            .ingest(doc(
                "notes-1",
                Origin::Lecture,
                "Support vector machines maximize the margin between classes.",
            ))
            .await
            .unwrap();
        assert!(!report.skipped_unchanged);

        let outcome = retriever
            .query("support vector machines margin", None)
            .await
            .unwrap();
        assert!(outcome.found);
        assert!(outcome.context.contains("margin between classes"));
        assert!(!outcome.context.contains("perceptron"));

        let stored = store.get_document("notes-1").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_reingest_unchanged_content_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let retriever = retriever_over(&store, Arc::new(HashEmbedder::new(64)));

        let body = "Bayes rule inverts conditional probabilities.";
        retriever
            .ingest(doc("bayes-1", Origin::Lecture, body))
            .await
            .unwrap();
        let report = retriever
            .ingest(doc("bayes-1", Origin::Lecture, body))
            .await
            .unwrap();

        assert!(report.skipped_unchanged);
        assert_eq!(report.chunks, 0);
        let stored = store.get_document("bayes-1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_transient_embedding_failures_are_retried() {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(FlakyEmbedder::new(2));
        let retriever = retriever_over(&store, embedder.clone());

        let report = retriever
            .ingest(doc(
                "flaky-1",
                Origin::Lecture,
                "Stochastic gradient descent uses one example per step.",
            ))
            .await
            .unwrap();

        assert_eq!(report.chunks, 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejected_embedding_is_not_retried() {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(RejectingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let retriever = retriever_over(&store, embedder.clone());

        let err = retriever
            .ingest(doc("reject-1", Origin::Lecture, "Some ordinary body text."))
            .await
            .unwrap_err();

        assert!(matches!(err, RetrieveError::EmbeddingRejected(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_failure_reports_embedding_stage() {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(RejectingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let retriever = retriever_over(&store, embedder);

        let err = retriever.query("any question", None).await.unwrap_err();
        assert_eq!(err.stage, Stage::Embedding);
        assert!(!err.source.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_removes_from_results() {
        let store = Arc::new(MemoryStore::new());
        let retriever = retriever_over(&store, Arc::new(HashEmbedder::new(256)));

        retriever
            .ingest(doc(
                "gone-1",
                Origin::ForumPost,
                "Dropout randomly disables units during training.",
            ))
            .await
            .unwrap();
        retriever.delete("gone-1").await.unwrap();

        let outcome = retriever
            .query("dropout disables units", None)
            .await
            .unwrap();
        assert!(!outcome.found);
        assert!(store.get_document("gone-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_filter_restricts_origin() {
        let store = Arc::new(MemoryStore::new());
        let retriever = retriever_over(&store, Arc::new(HashEmbedder::new(256)));

        retriever
            .ingest(doc(
                "lec-reg",
                Origin::Lecture,
                "Regularization penalizes large weights.",
            ))
            .await
            .unwrap();
        retriever
            .ingest(doc(
                "post-reg",
                Origin::ForumPost,
                "Regularization keeps weights small, try L2 first.",
            ))
            .await
            .unwrap();

        let filter = SearchFilter {
            origins: Some(vec![Origin::Lecture]),
            since: None,
        };
        let outcome = retriever
            .query("regularization weights", Some(filter))
            .await
            .unwrap();

        assert!(outcome.found);
        assert_eq!(outcome.citations.len(), 1);
        assert_eq!(outcome.citations[0].document_id, "lec-reg");
    }
}
