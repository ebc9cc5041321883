//! Feed-file ingestion.
//!
//! Turns scraper feed files into [`Document`]s. Two JSON shapes are
//! recognized, matching the course scrapers that feed the assistant:
//!
//! - course material: `{"pages": [{"url", "title", "content"}]}`, where
//!   `content` is either the text itself or an object carrying
//!   `raw_text`;
//! - forum exports: `{"topics": [{"url", "title", "posts":
//!   [{"content_text"}]}]}`, ingested one document per topic with the
//!   posts joined by blank lines.
//!
//! Records below `ingest.min_chars` are dropped and counted. Forum
//! locators are normalized (trailing post-anchor segment stripped) so
//! citations point at the topic page, and document ids derive from the
//! normalized locator, which is what lets a re-scrape line up with the
//! documents it produced last time.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use lectern_core::models::{Document, Origin};

use crate::config::IngestConfig;

/// Documents parsed out of one feed file, plus skip accounting.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub documents: Vec<Document>,
    pub skipped_short: usize,
}

#[derive(Debug, Deserialize)]
struct PagesFeed {
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: PageContent,
}

/// Page content is either the text itself or a structured object from
/// the richer scraper.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PageContent {
    Text(String),
    Structured {
        #[serde(default)]
        raw_text: String,
    },
    Other(serde_json::Value),
}

impl Default for PageContent {
    fn default() -> Self {
        PageContent::Text(String::new())
    }
}

impl PageContent {
    fn text(&self) -> &str {
        match self {
            PageContent::Text(text) => text,
            PageContent::Structured { raw_text } => raw_text,
            PageContent::Other(_) => "",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TopicsFeed {
    topics: Vec<Topic>,
}

#[derive(Debug, Deserialize)]
struct Topic {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    posts: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    content_text: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl Post {
    /// The scrapers disagree on the field name; take the first non-empty.
    fn text(&self) -> &str {
        self.content_text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.content.as_deref().filter(|t| !t.is_empty()))
            .or_else(|| self.text.as_deref())
            .unwrap_or("")
    }
}

/// Parse a feed file into documents.
///
/// `origin` applies to page records; topics always ingest as
/// `forum-post`.
pub fn parse_feed(
    raw: &str,
    origin: Origin,
    config: &IngestConfig,
    now: i64,
) -> Result<ParsedFeed> {
    let value: serde_json::Value = serde_json::from_str(raw).context("feed is not valid JSON")?;

    if value.get("pages").is_some() {
        let feed: PagesFeed = serde_json::from_value(value).context("malformed pages feed")?;
        Ok(parse_pages(feed, origin, config, now))
    } else if value.get("topics").is_some() {
        let feed: TopicsFeed = serde_json::from_value(value).context("malformed topics feed")?;
        Ok(parse_topics(feed, config, now))
    } else {
        bail!("unrecognized feed shape: expected a top-level \"pages\" or \"topics\" array");
    }
}

/// Wrap a plain text or markdown file as a single document. The file
/// stem becomes the title and the path the locator.
pub fn document_from_text(path: &Path, origin: Origin, raw: &str, now: i64) -> Document {
    let title = path.file_stem().map(|s| s.to_string_lossy().to_string());
    let locator = path.display().to_string();
    build_document(origin, title, locator, raw.to_string(), now)
}

fn parse_pages(feed: PagesFeed, origin: Origin, config: &IngestConfig, now: i64) -> ParsedFeed {
    let mut parsed = ParsedFeed::default();
    for page in feed.pages {
        let content = page.content.text().trim();
        if content.len() < config.min_chars {
            parsed.skipped_short += 1;
            continue;
        }
        let title = page.title.filter(|t| !t.trim().is_empty());
        parsed.documents.push(build_document(
            origin,
            title,
            page.url.trim().to_string(),
            content.to_string(),
            now,
        ));
    }
    parsed
}

fn parse_topics(feed: TopicsFeed, config: &IngestConfig, now: i64) -> ParsedFeed {
    let mut parsed = ParsedFeed::default();
    for topic in feed.topics {
        let posts: Vec<&str> = topic
            .posts
            .iter()
            .map(|p| p.text().trim())
            .filter(|t| !t.is_empty())
            .collect();
        let body = posts.join("\n\n");
        if body.len() < config.min_chars {
            parsed.skipped_short += 1;
            continue;
        }
        let title = topic.title.filter(|t| !t.trim().is_empty());
        let locator = clean_forum_locator(topic.url.trim());
        parsed
            .documents
            .push(build_document(Origin::ForumPost, title, locator, body, now));
    }
    parsed
}

/// Normalize a forum topic URL: drop a trailing `/0`, then a trailing
/// numeric post-anchor segment on deep paths, so the locator cites the
/// topic page rather than one post within it.
fn clean_forum_locator(url: &str) -> String {
    if let Some(stripped) = url.strip_suffix("/0") {
        return stripped.to_string();
    }
    let parts: Vec<&str> = url.split('/').collect();
    if parts.len() >= 6
        && parts
            .last()
            .map_or(false, |p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return parts[..parts.len() - 1].join("/");
    }
    url.to_string()
}

fn build_document(
    origin: Origin,
    title: Option<String>,
    locator: String,
    body: String,
    now: i64,
) -> Document {
    let id = if locator.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        let hex = format!("{:x}", Sha256::digest(locator.as_bytes()));
        hex[..16].to_string()
    };
    let content_hash = format!("{:x}", Sha256::digest(body.as_bytes()));

    Document {
        id,
        origin,
        title,
        locator,
        author: None,
        // Feeds carry no authoring date; recency falls back to
        // ingestion time downstream.
        posted_at: 0,
        ingested_at: now,
        body,
        content_hash,
        version: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IngestConfig {
        IngestConfig::default()
    }

    #[test]
    fn test_pages_feed_both_content_shapes() {
        let raw = r#"{
            "pages": [
                {
                    "url": "https://course.example/docs/regression",
                    "title": "Regression",
                    "content": "Linear regression fits a line by minimizing squared error over the training set."
                },
                {
                    "url": "https://course.example/docs/trees",
                    "title": "Decision Trees",
                    "content": {
                        "raw_text": "Decision trees split on the feature with the highest information gain at each node.",
                        "headings": ["Splitting"],
                        "links": []
                    }
                }
            ]
        }"#;

        let parsed = parse_feed(raw, Origin::Lecture, &config(), 1_700_000_000).unwrap();
        assert_eq!(parsed.documents.len(), 2);
        assert_eq!(parsed.skipped_short, 0);
        assert_eq!(parsed.documents[0].origin, Origin::Lecture);
        assert_eq!(parsed.documents[0].title.as_deref(), Some("Regression"));
        assert!(parsed.documents[1].body.starts_with("Decision trees split"));
        assert_eq!(parsed.documents[0].ingested_at, 1_700_000_000);
    }

    #[test]
    fn test_short_pages_are_counted_not_ingested() {
        let raw = r#"{
            "pages": [
                { "url": "https://course.example/a", "title": "A", "content": "too short" },
                { "url": "https://course.example/b", "title": "B", "content": "This page is comfortably longer than the minimum length." }
            ]
        }"#;

        let parsed = parse_feed(raw, Origin::Slide, &config(), 0).unwrap();
        assert_eq!(parsed.documents.len(), 1);
        assert_eq!(parsed.skipped_short, 1);
        assert_eq!(parsed.documents[0].origin, Origin::Slide);
    }

    #[test]
    fn test_topics_join_posts_with_blank_lines() {
        let raw = r#"{
            "topics": [
                {
                    "url": "https://forum.example/t/loss-functions/123/4",
                    "title": "Loss functions",
                    "posts": [
                        { "content_text": "Which loss should I use for logistic regression?" },
                        { "content_text": "" },
                        { "content_text": "Log loss, not squared error." }
                    ]
                }
            ]
        }"#;

        let parsed = parse_feed(raw, Origin::Lecture, &config(), 42).unwrap();
        assert_eq!(parsed.documents.len(), 1);
        let doc = &parsed.documents[0];
        assert_eq!(doc.origin, Origin::ForumPost);
        assert_eq!(
            doc.body,
            "Which loss should I use for logistic regression?\n\nLog loss, not squared error."
        );
        assert_eq!(doc.locator, "https://forum.example/t/loss-functions/123");
    }

    #[test]
    fn test_topic_with_no_usable_posts_is_skipped() {
        let raw = r#"{
            "topics": [
                { "url": "https://forum.example/t/empty/9", "title": "Empty", "posts": [ { "content_text": "  " } ] }
            ]
        }"#;

        let parsed = parse_feed(raw, Origin::Lecture, &config(), 0).unwrap();
        assert!(parsed.documents.is_empty());
        assert_eq!(parsed.skipped_short, 1);
    }

    #[test]
    fn test_post_field_fallbacks() {
        let raw = r#"{
            "topics": [
                {
                    "url": "https://forum.example/t/alt-fields/55",
                    "title": "Alt fields",
                    "posts": [
                        { "content": "Some scrapers call the field content instead of content_text." },
                        { "text": "And one calls it text." }
                    ]
                }
            ]
        }"#;

        let parsed = parse_feed(raw, Origin::Lecture, &config(), 0).unwrap();
        assert_eq!(parsed.documents.len(), 1);
        assert!(parsed.documents[0].body.contains("content instead of content_text"));
        assert!(parsed.documents[0].body.contains("calls it text"));
    }

    #[test]
    fn test_locator_cleanup() {
        assert_eq!(
            clean_forum_locator("https://forum.example/t/slug/123/0"),
            "https://forum.example/t/slug/123"
        );
        assert_eq!(
            clean_forum_locator("https://forum.example/t/slug/123/7"),
            "https://forum.example/t/slug/123"
        );
        // Short paths keep their trailing id.
        assert_eq!(
            clean_forum_locator("https://forum.example/t/99"),
            "https://forum.example/t/99"
        );
        // Non-numeric tails are left alone.
        assert_eq!(
            clean_forum_locator("https://forum.example/t/category/a-long-slug"),
            "https://forum.example/t/category/a-long-slug"
        );
    }

    #[test]
    fn test_ids_are_stable_across_rescrapes() {
        let raw = r#"{
            "topics": [
                {
                    "url": "https://forum.example/t/stable/77/3",
                    "title": "Stable",
                    "posts": [ { "content_text": "The same topic scraped twice must keep its identity." } ]
                }
            ]
        }"#;

        let first = parse_feed(raw, Origin::Lecture, &config(), 1).unwrap();
        let second = parse_feed(raw, Origin::Lecture, &config(), 2).unwrap();
        assert_eq!(first.documents[0].id, second.documents[0].id);
        assert_eq!(first.documents[0].id.len(), 16);
    }

    #[test]
    fn test_unrecognized_shape_is_an_error() {
        let err = parse_feed(r#"{"records": []}"#, Origin::Lecture, &config(), 0).unwrap_err();
        assert!(err.to_string().contains("unrecognized feed shape"));
    }

    #[test]
    fn test_document_from_text_uses_stem_and_path() {
        let doc = document_from_text(
            Path::new("notes/week3-logistic.md"),
            Origin::Lecture,
            "Logistic regression outputs probabilities through the sigmoid.",
            7,
        );
        assert_eq!(doc.title.as_deref(), Some("week3-logistic"));
        assert_eq!(doc.locator, "notes/week3-logistic.md");
        assert_eq!(doc.origin, Origin::Lecture);
        assert_eq!(doc.ingested_at, 7);
        assert_eq!(doc.posted_at, 0);
    }
}
