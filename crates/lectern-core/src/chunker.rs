//! Document chunking.
//!
//! Splits a document body into overlapping segments sized for embedding.
//! Chunking is deterministic: the same body under the same policy always
//! produces the same chunk sequence, and chunk ids are derived from the
//! document id, version, and chunk index rather than generated randomly.
//!
//! Fenced code blocks are never split. A fence region longer than the
//! target length is emitted as a single oversized chunk instead.

use crate::error::{Result, RetrieveError};
use crate::models::{Chunk, Document};

/// Approximate characters per token for budget estimation.
const CHARS_PER_TOKEN: usize = 4;

/// Chunk sizing policy.
///
/// Budgets are expressed in approximate tokens and converted to byte
/// budgets internally. `overlap_tokens` is the margin carried from the
/// end of one chunk into the start of the next so sentences straddling a
/// boundary stay intact in at least one chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPolicy {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            max_tokens: 400,
            overlap_tokens: 50,
        }
    }
}

impl ChunkPolicy {
    fn budget(&self) -> usize {
        self.max_tokens * CHARS_PER_TOKEN
    }

    fn overlap(&self) -> usize {
        self.overlap_tokens * CHARS_PER_TOKEN
    }
}

/// Split a document into chunks.
///
/// Returns a lazy iterator over the chunks. The iterator is `Clone`, and
/// calling `chunk` again with the same inputs yields an identical
/// sequence.
///
/// # Errors
///
/// `EmptyDocument` when the body is blank after trimming.
pub fn chunk<'a>(doc: &'a Document, policy: &ChunkPolicy) -> Result<Chunks<'a>> {
    if doc.body.trim().is_empty() {
        return Err(RetrieveError::EmptyDocument(doc.id.clone()));
    }

    Ok(Chunks {
        body: &doc.body,
        document_id: &doc.id,
        version: doc.version,
        budget: policy.budget().max(CHARS_PER_TOKEN),
        overlap: policy.overlap(),
        regions: fence_regions(&doc.body),
        pos: 0,
        index: 0,
        done: false,
    })
}

/// Lazy chunk iterator produced by [`chunk`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    body: &'a str,
    document_id: &'a str,
    version: i64,
    budget: usize,
    overlap: usize,
    /// Byte ranges of fenced code blocks, ascending, non-overlapping.
    regions: Vec<(usize, usize)>,
    pos: usize,
    index: i64,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }
        let len = self.body.len();
        let start = self.pos;

        let mut end = if len - start <= self.budget {
            len
        } else {
            self.split_point(start)
        };

        // A split landing inside a fence region extends to the region end,
        // emitting the whole block as one oversized chunk.
        if end < len {
            for &(rs, re) in &self.regions {
                if end > rs && end < re {
                    end = re.min(len);
                    break;
                }
            }
        }

        let chunk = Chunk {
            id: chunk_id(self.document_id, self.version, self.index),
            document_id: self.document_id.to_string(),
            chunk_index: self.index,
            start,
            end,
            text: self.body[start..end].to_string(),
            version: self.version,
        };
        self.index += 1;

        if end >= len {
            self.done = true;
        } else {
            let mut next = end.saturating_sub(self.overlap);
            // Never start a chunk inside a fence region.
            for &(rs, re) in &self.regions {
                if next > rs && next < re {
                    next = re;
                    break;
                }
            }
            while next < len && !self.body.is_char_boundary(next) {
                next += 1;
            }
            // Guard against a degenerate overlap swallowing the whole chunk.
            if next <= start {
                next = end;
            }
            self.pos = next;
        }

        Some(chunk)
    }
}

impl<'a> Chunks<'a> {
    /// Find the end of the chunk starting at `start`.
    ///
    /// Searches the back half of the byte window for a newline, then a
    /// space, and falls back to a hard cut at the budget. The back-half
    /// floor keeps every non-final chunk at least half the budget long,
    /// which guarantees forward progress with any sane overlap.
    fn split_point(&self, start: usize) -> usize {
        let mut hard = start + self.budget;
        while !self.body.is_char_boundary(hard) {
            hard -= 1;
        }
        let mut floor = start + self.budget / 2;
        while floor < hard && !self.body.is_char_boundary(floor) {
            floor += 1;
        }

        let window = &self.body[floor..hard];
        if let Some(i) = window.rfind('\n') {
            return floor + i + 1;
        }
        if let Some(i) = window.rfind(' ') {
            return floor + i + 1;
        }
        hard
    }
}

/// Deterministic chunk id: `{document_id}@{version}#{index:04}`.
pub fn chunk_id(document_id: &str, version: i64, index: i64) -> String {
    format!("{}@{}#{:04}", document_id, version, index)
}

/// Locate fenced code blocks (``` delimited) as byte ranges.
///
/// An unterminated fence runs to the end of the body. Offsets are line
/// starts/ends and therefore always char boundaries.
fn fence_regions(body: &str) -> Vec<(usize, usize)> {
    let mut regions = Vec::new();
    let mut open: Option<usize> = None;
    let mut pos = 0;

    for line in body.split_inclusive('\n') {
        if line.trim_start().starts_with("```") {
            match open.take() {
                None => open = Some(pos),
                Some(start) => regions.push((start, pos + line.len())),
            }
        }
        pos += line.len();
    }
    if let Some(start) = open {
        regions.push((start, body.len()));
    }
    regions
}
