//! Answer generation over retrieved context.
//!
//! [`OpenAiAnswerer`] implements the [`Answerer`] seam against an
//! OpenAI-compatible chat-completions endpoint. The retrieval pipeline
//! supplies the context and citations; the model is instructed to answer
//! from that context alone and to say so when the context is not enough.

use anyhow::{Context, Result};
use async_trait::async_trait;

use lectern_core::embed::Answerer;
use lectern_core::models::Citation;

use crate::config::AnswererConfig;

const SYSTEM_PROMPT: &str = "You are a teaching assistant for a university course. \
Answer the student's question using ONLY the provided course context. \
If the context does not contain the answer, say that you could not find it \
in the course materials. Keep answers short and concrete, and mention the \
bracketed source numbers you drew from.";

/// Chat-completions client implementing the [`Answerer`] seam.
pub struct OpenAiAnswerer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: usize,
}

impl OpenAiAnswerer {
    pub fn new(config: &AnswererConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

/// Combine context, a numbered source list, and the question into the
/// user message. Source numbers follow citation (rank) order.
fn build_user_message(question: &str, context: &str, citations: &[Citation]) -> String {
    let mut message = String::from("Course context:\n\n");
    message.push_str(context);
    if !citations.is_empty() {
        message.push_str("\n\nSources:\n");
        for (i, citation) in citations.iter().enumerate() {
            let label = citation.title.as_deref().unwrap_or(&citation.locator);
            message.push_str(&format!("[{}] {}\n", i + 1, label));
        }
    }
    message.push_str("\nQuestion: ");
    message.push_str(question);
    message
}

#[async_trait]
impl Answerer for OpenAiAnswerer {
    async fn answer(
        &self,
        question: &str,
        context: &str,
        citations: &[Citation],
    ) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_user_message(question, context, citations) },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("answerer request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            anyhow::bail!("answerer API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("failed to parse answerer response")?;

        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| {
                anyhow::anyhow!("answerer response missing choices[0].message.content")
            })?;

        Ok(content.trim().to_string())
    }
}
