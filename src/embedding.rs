//! Embedding providers.
//!
//! Concrete implementations of the [`Embedder`] seam:
//! - **[`OpenAiEmbedder`]**: calls an OpenAI-compatible `POST /embeddings`
//!   endpoint.
//! - **[`HashEmbedder`]**: deterministic feature-hash vectors with no
//!   network or model assets; used for tests and offline operation.
//!
//! Providers make exactly one attempt per call and classify failures
//! through [`RetrieveError`]: 429, 5xx, and transport errors become
//! [`RetrieveError::EmbeddingUnavailable`] (retryable), other 4xx become
//! [`RetrieveError::EmbeddingRejected`] (not retryable). Retry counts,
//! backoff, and deadlines belong to the retriever, not here.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use anyhow::{bail, Result};

use lectern_core::embed::Embedder;
use lectern_core::error::RetrieveError;

use crate::config::EmbeddingConfig;

/// Instantiate the embedder named by `embedding.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dims.unwrap_or(256)))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embedding provider for an OpenAI-compatible embeddings API.
///
/// Requires `embedding.model` and `embedding.dims` in the configuration
/// and an API key in the environment variable named by
/// `embedding.api_key_env`.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for the openai provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for the openai provider"))?;
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            dims,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, RetrieveError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrieveError::EmbeddingUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = format!("embedding API error {}: {}", status, body_text);
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(RetrieveError::EmbeddingUnavailable(message));
            }
            return Err(RetrieveError::EmbeddingRejected(message));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RetrieveError::EmbeddingUnavailable(e.to_string()))?;

        parse_embeddings_response(&json, texts.len())
    }
}

/// Extract the `data[].embedding` arrays from an embeddings API response.
fn parse_embeddings_response(
    json: &serde_json::Value,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, RetrieveError> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        RetrieveError::EmbeddingUnavailable("invalid embeddings response: missing data array".into())
    })?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                RetrieveError::EmbeddingUnavailable(
                    "invalid embeddings response: missing embedding".into(),
                )
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    if embeddings.len() != expected {
        return Err(RetrieveError::EmbeddingUnavailable(format!(
            "embeddings response returned {} vectors for {} inputs",
            embeddings.len(),
            expected
        )));
    }

    Ok(embeddings)
}

/// Deterministic embedder that needs no network access or model assets.
///
/// Each text becomes a bag-of-tokens vector: tokens are hashed into one
/// of `dims` signed buckets and the result is L2-normalized, so texts
/// sharing vocabulary score high under cosine similarity. Never fails.
pub struct HashEmbedder {
    dims: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            model_id: format!("hash-{}", dims),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dims;
            let sign = if digest[31] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, RetrieveError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
