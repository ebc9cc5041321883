//! Embedder and answerer trait seams, plus vector utilities.
//!
//! Both capabilities are external to the retrieval core: embedding maps
//! text to vectors, answering turns (question, context, citations) into
//! prose. The core only defines the contracts; concrete HTTP providers
//! live in the application crate.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Citation;

/// External embedding capability.
///
/// Must be deterministic for identical text and model version. A single
/// call embeds a batch; callers batch chunk texts per document to keep
/// round-trips down.
///
/// # Errors
///
/// `EmbeddingUnavailable` for transient failures (callers may retry with
/// backoff), `EmbeddingRejected` when the input itself is unacceptable.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`). Stored with
    /// every vector; a mismatch invalidates the stored embedding.
    fn model_id(&self) -> &str;

    /// Vector dimensionality (e.g. `1536`).
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// External answering capability.
///
/// The retrieval core supplies context and citations; the answerer
/// generates the prose. Nothing in this crate calls it; it is the
/// boundary the application hands retrieval output across.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(
        &self,
        question: &str,
        context: &str,
        citations: &[Citation],
    ) -> anyhow::Result<String>;
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors
/// of different lengths. This is the single similarity metric used at
/// both index population and query time.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
