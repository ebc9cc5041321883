//! Core data models used throughout lectern.
//!
//! These types represent the documents, chunks, and query results that
//! flow through the ingestion and retrieval pipeline. Timestamps are unix
//! seconds; offsets are byte offsets into the parent document's body.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a document came from.
///
/// Serialized in kebab-case (`forum-post`) both in JSON output and in the
/// database's `origin` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    Lecture,
    Slide,
    ForumPost,
    Attachment,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Lecture => "lecture",
            Origin::Slide => "slide",
            Origin::ForumPost => "forum-post",
            Origin::Attachment => "attachment",
        }
    }

    /// All origins, in a fixed order.
    pub fn all() -> [Origin; 4] {
        [
            Origin::Lecture,
            Origin::Slide,
            Origin::ForumPost,
            Origin::Attachment,
        ]
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lecture" => Ok(Origin::Lecture),
            "slide" => Ok(Origin::Slide),
            "forum-post" => Ok(Origin::ForumPost),
            "attachment" => Ok(Origin::Attachment),
            other => Err(format!(
                "unknown origin '{}' (expected lecture, slide, forum-post, or attachment)",
                other
            )),
        }
    }
}

/// A source document held in the document store.
///
/// Immutable once ingested, except that re-ingesting the same id replaces
/// the prior content under a higher `version`. The `version` on a stored
/// document is its committed version: index entries and chunk records at
/// that version are the visible generation, anything else is staged or
/// stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub origin: Origin,
    pub title: Option<String>,
    /// URL or file path the document came from.
    pub locator: String,
    pub author: Option<String>,
    /// When the source material was written or posted.
    pub posted_at: i64,
    pub ingested_at: i64,
    pub body: String,
    /// SHA-256 of the body, for re-scrape change detection.
    pub content_hash: String,
    pub version: i64,
}

/// A contiguous span of a document's body text.
///
/// Chunk ids are deterministic: `{document_id}@{version}#{index:04}`.
/// Two generations of one document therefore never share chunk ids,
/// which is what lets a re-ingest stage its chunks alongside the old
/// ones without collisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    /// Byte offset range into the parent body.
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub version: i64,
}

/// A fixed-length vector plus the model that produced it.
///
/// An embedding is only valid against the model it was generated with;
/// a stored vector whose `model_id` differs from the configured embedder
/// is treated as missing and regenerated.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model_id: String,
}

/// The vector index's stored unit.
///
/// Carries just enough metadata for pre-k filtering (origin, timestamp)
/// and for version visibility checks. Never mutated in place; replacement
/// is delete-then-insert keyed by `chunk_id`.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub origin: Origin,
    pub posted_at: i64,
    pub version: i64,
    pub embedding: Embedding,
}

/// Metadata predicate applied by the index before the k-limit.
///
/// An entry filtered out here never counts against k. `None` fields
/// match everything.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Keep only entries whose origin is in this set.
    pub origins: Option<Vec<Origin>>,
    /// Keep only entries posted at or after this time.
    pub since: Option<i64>,
}

impl SearchFilter {
    pub fn matches(&self, origin: Origin, posted_at: i64) -> bool {
        if let Some(ref origins) = self.origins {
            if !origins.contains(&origin) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if posted_at < since {
                return false;
            }
        }
        true
    }
}

/// A nearest-neighbor hit returned from the vector index.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub similarity: f32,
}

/// A search hit hydrated with the chunk and document fields that ranking
/// and citation assembly need. Query-scoped, never persisted.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk_id: String,
    pub document_id: String,
    pub origin: Origin,
    pub title: Option<String>,
    pub locator: String,
    pub posted_at: i64,
    pub similarity: f32,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Per-signal score breakdown for a ranked result.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreSignals {
    pub similarity: f64,
    pub recency: f64,
    pub term_overlap: f64,
}

/// A candidate with its final rank score. Query-scoped, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub chunk_id: String,
    pub document_id: String,
    pub origin: Origin,
    pub title: Option<String>,
    pub locator: String,
    pub posted_at: i64,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub score: f64,
    pub signals: ScoreSignals,
}

/// A chunk's offset range within its parent document, as cited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// One cited source document with its contributing spans.
///
/// Citations are deduplicated by document: several chunks from one
/// document collapse into a single citation whose spans are listed in
/// rank order, highest-relevance evidence first.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub document_id: String,
    pub title: Option<String>,
    pub locator: String,
    pub spans: Vec<Span>,
}

/// The outcome of a query: context for the answerer plus its citations.
///
/// `found: false` with empty context and citations is the "no relevant
/// context" result, a success rather than an error.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub found: bool,
    pub context: String,
    pub citations: Vec<Citation>,
}

impl QueryOutcome {
    /// The explicit empty outcome returned when the index has nothing
    /// relevant.
    pub fn not_found() -> Self {
        Self {
            found: false,
            context: String::new(),
            citations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_round_trip() {
        for origin in Origin::all() {
            let parsed: Origin = origin.as_str().parse().unwrap();
            assert_eq!(parsed, origin);
        }
    }

    #[test]
    fn test_origin_rejects_unknown() {
        assert!("homework".parse::<Origin>().is_err());
    }

    #[test]
    fn test_origin_serde_kebab_case() {
        let json = serde_json::to_string(&Origin::ForumPost).unwrap();
        assert_eq!(json, "\"forum-post\"");
    }

    #[test]
    fn test_filter_matches_origin_and_since() {
        let filter = SearchFilter {
            origins: Some(vec![Origin::ForumPost, Origin::Lecture]),
            since: Some(100),
        };
        assert!(filter.matches(Origin::ForumPost, 100));
        assert!(filter.matches(Origin::Lecture, 500));
        assert!(!filter.matches(Origin::Slide, 500));
        assert!(!filter.matches(Origin::ForumPost, 99));
    }

    #[test]
    fn test_default_filter_matches_everything() {
        let filter = SearchFilter::default();
        assert!(filter.matches(Origin::Attachment, 0));
        assert!(filter.matches(Origin::Lecture, i64::MAX));
    }

    #[test]
    fn test_not_found_outcome_is_empty() {
        let outcome = QueryOutcome::not_found();
        assert!(!outcome.found);
        assert!(outcome.context.is_empty());
        assert!(outcome.citations.is_empty());
    }
}
