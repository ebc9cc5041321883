//! Candidate ranking.
//!
//! Combines vector similarity with recency and exact-term overlap into a
//! final score: `w1*similarity + w2*recency + w3*term_overlap`. Weights
//! default to similarity-dominant. Ranking is a pure reordering stage: it
//! never adds or drops candidates, and the same inputs always produce the
//! same order (ties broken by chunk id).

use std::collections::{BTreeSet, HashSet};

use crate::models::{Candidate, RankedResult, ScoreSignals};

/// Words stripped from questions before term-overlap scoring.
pub const STOP_WORDS: &[&str] = &[
    "is", "in", "on", "at", "to", "of", "it", "as", "be", "by", "or", "an", "do", "if", "the",
    "and", "for", "are", "was", "can", "you", "has", "had", "why", "what", "which", "where",
    "when", "does", "have", "with", "that", "this", "from", "about", "some", "there", "their",
    "they", "your", "been", "were", "how", "could", "would", "should", "shall", "will", "into",
    "also", "just", "like", "make", "using", "used", "need", "want", "find", "know", "tell",
    "many", "much", "very", "really", "please", "help", "more", "most", "only",
];

/// Relative weight of each ranking signal.
#[derive(Debug, Clone, Copy)]
pub struct RankWeights {
    pub similarity: f64,
    pub recency: f64,
    pub term_overlap: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            similarity: 1.0,
            recency: 0.1,
            term_overlap: 0.25,
        }
    }
}

/// Ranking parameters: weights, recency half-life, and the reference
/// clock. `now` is supplied by the caller so ranking stays a pure
/// function of its inputs.
#[derive(Debug, Clone)]
pub struct RankParams {
    pub weights: RankWeights,
    pub half_life_days: f64,
    pub now: i64,
}

impl RankParams {
    pub fn new(now: i64) -> Self {
        Self {
            weights: RankWeights::default(),
            half_life_days: 30.0,
            now,
        }
    }
}

/// Score and order candidates.
///
/// Returns one [`RankedResult`] per input candidate, ordered by
/// descending score with ties broken by ascending chunk id.
pub fn rank(question: &str, candidates: Vec<Candidate>, params: &RankParams) -> Vec<RankedResult> {
    let terms = question_terms(question);
    let w = params.weights;

    let mut results: Vec<RankedResult> = candidates
        .into_iter()
        .map(|c| {
            let similarity = c.similarity as f64;
            let recency = recency_factor(c.posted_at, params.now, params.half_life_days);
            let term_overlap = term_overlap_factor(&terms, &c.text);
            let score =
                w.similarity * similarity + w.recency * recency + w.term_overlap * term_overlap;
            RankedResult {
                chunk_id: c.chunk_id,
                document_id: c.document_id,
                origin: c.origin,
                title: c.title,
                locator: c.locator,
                posted_at: c.posted_at,
                text: c.text,
                start: c.start,
                end: c.end,
                score,
                signals: ScoreSignals {
                    similarity,
                    recency,
                    term_overlap,
                },
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    results
}

/// Distinct question terms: lower-cased, split on non-alphanumeric
/// characters, stop words and single characters removed.
pub fn question_terms(question: &str) -> BTreeSet<String> {
    let lower = question.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Fraction of question terms present verbatim (as whole tokens) in the
/// chunk text. `0.0` when no terms survive stop-word filtering.
fn term_overlap_factor(terms: &BTreeSet<String>, text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let tokens: HashSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let matched = terms.iter().filter(|t| tokens.contains(t.as_str())).count();
    matched as f64 / terms.len() as f64
}

/// Exponential decay with the configured half-life: `1.0` for a document
/// posted now, `0.5` at one half-life of age, and so on. Future
/// timestamps clamp to `1.0`.
fn recency_factor(posted_at: i64, now: i64, half_life_days: f64) -> f64 {
    let half_life_secs = half_life_days * 86_400.0;
    if half_life_secs <= 0.0 {
        return 1.0;
    }
    let age_secs = (now - posted_at).max(0) as f64;
    0.5_f64.powf(age_secs / half_life_secs)
}
