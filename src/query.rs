//! The query and ask commands.
//!
//! `query` runs the retrieval pipeline and prints the assembled context
//! with its citations; `ask` continues through the configured answerer.
//! Both accept origin and since filters, applied by the index before
//! the candidate limit.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;

use lectern_core::embed::Answerer;
use lectern_core::models::{Citation, Origin, SearchFilter};

use crate::answer::OpenAiAnswerer;
use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::retriever::Retriever;
use crate::sqlite_store::SqliteStore;

/// Run retrieval and print the context block and citations.
pub async fn run_query(
    config: &Config,
    question: &str,
    origins: &[String],
    since: Option<String>,
    top_n: Option<usize>,
    json: bool,
) -> Result<()> {
    if question.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let filter = build_filter(origins, since.as_deref())?;

    let mut config = config.clone();
    if let Some(n) = top_n {
        config.retrieval.top_n = n;
    }

    let pool = db::connect(&config).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let embedder = embedding::create_embedder(&config.embedding)?;
    let retriever = Retriever::new(store.clone(), store, embedder, &config);

    let outcome = retriever.query(question, filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        pool.close().await;
        return Ok(());
    }

    if !outcome.found {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    println!("{}", outcome.context);
    print_citations(&outcome.citations);

    pool.close().await;
    Ok(())
}

/// Run retrieval, then answer the question over the retrieved context.
pub async fn run_ask(
    config: &Config,
    question: &str,
    origins: &[String],
    since: Option<String>,
) -> Result<()> {
    if !config.answerer.enabled {
        bail!("Answerer is disabled. Set [answerer] enabled = true in config.");
    }
    if question.trim().is_empty() {
        bail!("Question is empty.");
    }

    let filter = build_filter(origins, since.as_deref())?;

    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let embedder = embedding::create_embedder(&config.embedding)?;
    let retriever = Retriever::new(store.clone(), store, embedder, config);

    let outcome = retriever.query(question, filter).await?;

    // Nothing relevant: answer from the fixed fallback, no model call.
    if !outcome.found {
        println!("I could not find relevant information in the course materials.");
        pool.close().await;
        return Ok(());
    }

    let answerer = OpenAiAnswerer::new(&config.answerer)?;
    let answer = answerer
        .answer(question, &outcome.context, &outcome.citations)
        .await?;

    println!("{}", answer);
    println!();
    print_citations(&outcome.citations);

    pool.close().await;
    Ok(())
}

fn print_citations(citations: &[Citation]) {
    if citations.is_empty() {
        return;
    }
    println!("Sources:");
    for (i, citation) in citations.iter().enumerate() {
        let title = citation.title.as_deref().unwrap_or("(untitled)");
        println!("  [{}] {} — {}", i + 1, title, citation.locator);
    }
}

/// Build the index filter from CLI flags. Origins parse by their
/// kebab-case names; `since` accepts YYYY-MM-DD.
fn build_filter(origins: &[String], since: Option<&str>) -> Result<Option<SearchFilter>> {
    if origins.is_empty() && since.is_none() {
        return Ok(None);
    }

    let parsed_origins = if origins.is_empty() {
        None
    } else {
        let list = origins
            .iter()
            .map(|name| name.parse::<Origin>().map_err(|e| anyhow!(e)))
            .collect::<Result<Vec<_>>>()?;
        Some(list)
    };

    let since_ts = match since {
        Some(s) => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("Invalid --since date: {}", s))?;
            Some(date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp())
        }
        None => None,
    };

    Ok(Some(SearchFilter {
        origins: parsed_origins,
        since: since_ts,
    }))
}
