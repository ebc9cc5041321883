//! Citation assembly.
//!
//! Turns a ranked result list into the two outputs handed to the
//! answerer: a context string built from the top-N chunk texts in rank
//! order, and a citation list grouped by source document. The two are
//! always consistent: every citation traces to a context block and every
//! context block to a citation.

use std::collections::HashMap;

use crate::models::{Citation, Origin, RankedResult, Span};

/// Assemble context text and citations from ranked results.
///
/// Takes the first `top_n` results. Context blocks appear in rank order,
/// each under a header naming the origin and source. Citations are
/// deduplicated by document id, ordered by each document's best-ranked
/// chunk, with contributing spans listed in rank order.
///
/// Pure function: identical inputs produce byte-identical outputs.
pub fn assemble(ranked: &[RankedResult], top_n: usize) -> (String, Vec<Citation>) {
    let selected = &ranked[..ranked.len().min(top_n)];

    let mut blocks: Vec<String> = Vec::with_capacity(selected.len());
    let mut citations: Vec<Citation> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();

    for r in selected {
        blocks.push(format!("{}\n{}", block_header(r), r.text));

        let span = Span {
            start: r.start,
            end: r.end,
        };
        match position.get(r.document_id.as_str()) {
            Some(&i) => citations[i].spans.push(span),
            None => {
                position.insert(r.document_id.as_str(), citations.len());
                citations.push(Citation {
                    document_id: r.document_id.clone(),
                    title: r.title.clone(),
                    locator: r.locator.clone(),
                    spans: vec![span],
                });
            }
        }
    }

    (blocks.join("\n\n"), citations)
}

/// Context block header: origin label plus the source name.
///
/// Falls back to the locator when the document has no title.
fn block_header(r: &RankedResult) -> String {
    let name = r.title.as_deref().unwrap_or(&r.locator);
    let label = match r.origin {
        Origin::ForumPost => "Forum Discussion",
        Origin::Lecture | Origin::Slide => "Course Material",
        Origin::Attachment => "Attachment",
    };
    format!("{} ({}):", label, name)
}
