//! Mapping helpers for chunk preparation and Qdrant results.

use crate::{
    processing::{chunking::Chunk, types::SourceSnippet},
    qdrant::{ScoredPoint, compute_chunk_hash},
};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Characters of chunk text quoted back in a source snippet.
pub(crate) const SNIPPET_CHARS: usize = 200;

/// Chunk with its content hash, ready for embedding.
#[derive(Debug, Clone)]
pub(crate) struct PreparedChunk {
    pub(crate) text: String,
    pub(crate) chunk_hash: String,
    pub(crate) start_index: usize,
}

/// A chunk returned by retrieval.
#[derive(Debug, Clone)]
pub(crate) struct RetrievedChunk {
    pub(crate) text: String,
    pub(crate) score: f32,
    pub(crate) metadata: Map<String, Value>,
}

/// Remove chunks whose text was already seen, keeping the first occurrence.
///
/// `seen` carries hashes across documents ingested together.
pub(crate) fn dedupe_chunks(
    chunks: Vec<Chunk>,
    seen: &mut HashSet<String>,
) -> (Vec<PreparedChunk>, usize) {
    let mut prepared = Vec::new();
    let mut skipped = 0;

    for Chunk { text, start_index } in chunks {
        if text.trim().is_empty() {
            continue;
        }
        let hash = compute_chunk_hash(&text);
        if seen.insert(hash.clone()) {
            prepared.push(PreparedChunk {
                text,
                chunk_hash: hash,
                start_index,
            });
        } else {
            skipped += 1;
        }
    }

    (prepared, skipped)
}

/// Map a Qdrant scored point into a retrieved chunk, keeping `source` and `start_index`.
pub(crate) fn map_scored_point(point: ScoredPoint) -> RetrievedChunk {
    let ScoredPoint { score, payload, .. } = point;

    let mut text = String::new();
    let mut metadata = Map::new();
    if let Some(mut map) = payload {
        if let Some(Value::String(value)) = map.remove("text") {
            text = value;
        }
        for key in ["source", "start_index"] {
            if let Some(value) = map.remove(key) {
                metadata.insert(key.to_string(), value);
            }
        }
    }

    RetrievedChunk {
        text,
        score,
        metadata,
    }
}

/// Build the snippet shown next to an answer.
pub(crate) fn to_source_snippet(chunk: RetrievedChunk) -> SourceSnippet {
    SourceSnippet {
        content: truncate_snippet(&chunk.text),
        score: chunk.score,
        metadata: chunk.metadata,
    }
}

fn truncate_snippet(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
