//! # Lectern
//!
//! A retrieval-and-citation pipeline for a course teaching assistant.
//!
//! Lectern ingests course material (lecture notes, slides, forum exports,
//! attachments), chunks and embeds it into a SQLite-backed vector index,
//! and answers questions by retrieving the most relevant chunks, ranking
//! them by similarity, term overlap, and recency, and assembling a context
//! block with citations back to the source documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │    Feeds     │──▶│  Retriever   │──▶│  SQLite   │
//! │ pages/topics │   │ chunk+embed  │   │ docs+vecs │
//! └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                             │
//!                        query ───────────────┤
//!                                             ▼
//!                                    ┌──────────────┐
//!                                    │ rank + cite  │──▶ context, citations
//!                                    └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lectern init                                  # create database
//! lectern ingest pages.json --origin lecture    # course material feed
//! lectern ingest topics.json                    # forum export
//! lectern query "which loss for logistic regression?"
//! lectern ask "which loss for logistic regression?"   # retrieval + answer
//! lectern status
//! ```
//!
//! Core types (documents, chunks, ranking, citations, the store seams)
//! live in the `lectern-core` crate; this crate wires them to SQLite,
//! the embedding and answerer providers, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`feed`] | Feed-file parsing into documents |
//! | [`retriever`] | Ingest and query orchestration |
//! | [`sqlite_store`] | SQLite document store and vector index |
//! | [`embedding`] | Embedding provider clients |
//! | [`answer`] | Chat-completions answerer |
//! | [`ingest`] | The ingest and delete commands |
//! | [`query`] | The query and ask commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`status`] | Index overview |
//! | [`reindex`] | Model-change re-embedding |

pub mod answer;
pub mod config;
pub mod db;
pub mod embedding;
pub mod feed;
pub mod ingest;
pub mod migrate;
pub mod query;
pub mod reindex;
pub mod retriever;
pub mod sqlite_store;
pub mod status;
