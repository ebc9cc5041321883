//! # Lectern Core
//!
//! Retrieval logic for lectern: data models, chunking, ranking, citation
//! assembly, the error taxonomy, and the store/embedder trait seams.
//!
//! This crate contains no tokio, sqlx, network, or filesystem code. The
//! async traits it defines are runtime-agnostic; the in-memory store
//! returns immediately-ready futures. Everything here is testable without
//! external services.

pub mod chunker;
pub mod cite;
pub mod embed;
pub mod error;
pub mod models;
pub mod rank;
pub mod store;
