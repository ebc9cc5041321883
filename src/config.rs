use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use lectern_core::chunker::ChunkPolicy;
use lectern_core::rank::{RankParams, RankWeights};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub answerer: AnswererConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

impl ChunkingConfig {
    pub fn policy(&self) -> ChunkPolicy {
        ChunkPolicy {
            max_tokens: self.max_tokens,
            overlap_tokens: self.overlap_tokens,
        }
    }
}

fn default_max_tokens() -> usize {
    400
}
fn default_overlap_tokens() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// How many nearest neighbors to pull from the index before ranking.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    /// How many ranked chunks feed the context and citations.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Deadline for each embedder or index call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts for retryable failures, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_k: default_candidate_k(),
            top_n: default_top_n(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_candidate_k() -> usize {
    24
}
fn default_top_n() -> usize {
    6
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_weight_similarity")]
    pub weight_similarity: f64,
    #[serde(default = "default_weight_recency")]
    pub weight_recency: f64,
    #[serde(default = "default_weight_term_overlap")]
    pub weight_term_overlap: f64,
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            weight_similarity: default_weight_similarity(),
            weight_recency: default_weight_recency(),
            weight_term_overlap: default_weight_term_overlap(),
            half_life_days: default_half_life_days(),
        }
    }
}

impl RankingConfig {
    pub fn params(&self, now: i64) -> RankParams {
        RankParams {
            weights: RankWeights {
                similarity: self.weight_similarity,
                recency: self.weight_recency,
                term_overlap: self.weight_term_overlap,
            },
            half_life_days: self.half_life_days,
            now,
        }
    }
}

fn default_weight_similarity() -> f64 {
    1.0
}
fn default_weight_recency() -> f64 {
    0.1
}
fn default_weight_term_overlap() -> f64 {
    0.25
}
fn default_half_life_days() -> f64 {
    30.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Feed records shorter than this are skipped.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    /// Documents embedded in parallel during batch ingestion.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_min_chars() -> usize {
    25
}
fn default_max_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai` or `hash` (deterministic, offline; for tests and dev).
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswererConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_answer_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_answer_max_tokens")]
    pub max_tokens: usize,
}

impl Default for AnswererConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_answer_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_answer_max_tokens(),
        }
    }
}

fn default_answer_model() -> String {
    "gpt-4-turbo".to_string()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_answer_max_tokens() -> usize {
    700
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens * 2 >= config.chunking.max_tokens {
        anyhow::bail!("chunking.overlap_tokens must be less than half of chunking.max_tokens");
    }

    // Validate retrieval
    if config.retrieval.candidate_k < 1 {
        anyhow::bail!("retrieval.candidate_k must be >= 1");
    }
    if config.retrieval.top_n < 1 {
        anyhow::bail!("retrieval.top_n must be >= 1");
    }
    if config.retrieval.retry_attempts < 1 {
        anyhow::bail!("retrieval.retry_attempts must be >= 1");
    }
    if config.retrieval.timeout_secs < 1 {
        anyhow::bail!("retrieval.timeout_secs must be >= 1");
    }

    // Validate ranking
    if config.ranking.weight_similarity <= 0.0 {
        anyhow::bail!("ranking.weight_similarity must be > 0");
    }
    if config.ranking.weight_recency < 0.0 || config.ranking.weight_term_overlap < 0.0 {
        anyhow::bail!("ranking weights must not be negative");
    }
    if config.ranking.half_life_days <= 0.0 {
        anyhow::bail!("ranking.half_life_days must be > 0");
    }

    // Validate ingest
    if config.ingest.max_concurrency < 1 {
        anyhow::bail!("ingest.max_concurrency must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        "hash" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai or hash.",
            other
        ),
    }
    if config.embedding.batch_size < 1 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }

    // Validate answerer
    if config.answerer.enabled && config.answerer.model.is_empty() {
        anyhow::bail!("answerer.model must be specified when answerer is enabled");
    }

    Ok(config)
}
