//! Error taxonomy for the retrieval pipeline.
//!
//! Every failure the pipeline can produce falls into one of the
//! [`RetrieveError`] variants. Callers branch on
//! [`is_retryable`](RetrieveError::is_retryable) to decide whether backing
//! off and trying again can help; the orchestrator owns that retry policy.
//!
//! "No relevant context found" is deliberately absent: an empty result is
//! a successful outcome (`QueryOutcome { found: false, .. }`), not an
//! error.

use std::fmt;

use thiserror::Error;

/// Failures surfaced by the retrieval pipeline.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// The document body was blank after normalization. Not retryable.
    #[error("document {0} has no text content")]
    EmptyDocument(String),

    /// The embedding service could not be reached or answered with a
    /// transient error (timeout, 429, 5xx). Retryable.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The embedding service rejected the input (too long, malformed).
    /// Retrying the same input cannot succeed.
    #[error("embedding input rejected: {0}")]
    EmbeddingRejected(String),

    /// The storage backend holding documents and vectors failed.
    /// Retryable.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),
}

impl RetrieveError {
    /// Whether a retry with backoff can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RetrieveError::EmbeddingUnavailable(_) | RetrieveError::IndexUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RetrieveError>;

/// Pipeline stage in which a query failed.
///
/// Reported alongside the underlying error so callers can distinguish
/// "the embedder is down" from "the index is down" without parsing
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Searching,
    Ranking,
    Assembling,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Embedding => "embedding",
            Stage::Searching => "searching",
            Stage::Ranking => "ranking",
            Stage::Assembling => "assembling",
        };
        write!(f, "{}", name)
    }
}

/// A query failure annotated with the stage that produced it.
#[derive(Debug, Error)]
#[error("query failed while {stage}: {source}")]
pub struct QueryError {
    pub stage: Stage,
    #[source]
    pub source: RetrieveError,
}

impl QueryError {
    pub fn new(stage: Stage, source: RetrieveError) -> Self {
        Self { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RetrieveError::EmbeddingUnavailable("timeout".into()).is_retryable());
        assert!(RetrieveError::IndexUnavailable("db locked".into()).is_retryable());
        assert!(!RetrieveError::EmbeddingRejected("too long".into()).is_retryable());
        assert!(!RetrieveError::EmptyDocument("doc-1".into()).is_retryable());
    }

    #[test]
    fn test_query_error_reports_stage() {
        let err = QueryError::new(
            Stage::Searching,
            RetrieveError::IndexUnavailable("gone".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("searching"));
        assert!(msg.contains("index unavailable"));
    }
}
