//! Recursive text splitting with overlap and start offsets.
//!
//! - Boundaries come from `semchunk-rs`, which prefers paragraph breaks, then line breaks, then
//!   sentence punctuation, then whitespace. It packs each chunk to `chunk_size - chunk_overlap`;
//!   anything still over that is re-split on `FALLBACK_SEPARATORS`, then by characters.
//! - Length is measured in characters by default or in tokenizer tokens
//!   (`TEXT_SPLITTER_LENGTH_UNIT=tokens`). Token counting prefers `tiktoken-rs` and falls back to
//!   a whitespace counter when no encoding can be loaded.
//! - Overlap is taken from the source text immediately before each chunk, starting on a word
//!   boundary, so every chunk is a verbatim slice of the document no longer than `chunk_size` and
//!   carries its character `start_index`.

use crate::config::LengthUnit;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::types::ChunkingError;

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Parameters controlling how a document is split.
#[derive(Debug, Clone)]
pub struct ChunkingOptions {
    /// Upper bound on the length of a chunk.
    pub chunk_size: usize,
    /// Length carried over from the end of the previous chunk.
    pub chunk_overlap: usize,
    /// Unit in which `chunk_size` and `chunk_overlap` are measured.
    pub unit: LengthUnit,
    /// Model whose tokenizer is used when measuring in tokens.
    pub model: String,
}

/// A slice of a document ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text.
    pub text: String,
    /// Offset of the first character of the chunk in the source text, in characters.
    pub start_index: usize,
}

/// Split `text` into overlapping chunks.
///
/// Returns an empty vector when the input is all whitespace.
pub fn split_text(text: &str, options: &ChunkingOptions) -> Result<Vec<Chunk>, ChunkingError> {
    if options.chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let counter = build_length_counter(options.unit, &options.model)?;
    Ok(split_with_counter(
        text,
        options.chunk_size,
        options.chunk_overlap,
        counter,
    ))
}

/// Build the length function for the configured unit.
pub(crate) fn build_length_counter(
    unit: LengthUnit,
    model: &str,
) -> Result<LengthCounter, ChunkingError> {
    match unit {
        LengthUnit::Chars => Ok(Arc::new(|segment: &str| segment.chars().count())),
        LengthUnit::Tokens => match build_tiktoken_counter(model) {
            Ok(counter) => Ok(counter),
            Err(error) => {
                tracing::warn!(
                    model,
                    error = %error,
                    "Tokenizer unavailable; falling back to whitespace counter"
                );
                Ok(whitespace_counter())
            }
        },
    }
}

fn build_tiktoken_counter(model: &str) -> Result<LengthCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

/// Resolve a tokenizer by model name, then by encoding name, then `cl100k_base`.
pub(crate) fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::debug!(model, "Falling back to 'cl100k_base' encoding");
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

fn whitespace_counter() -> LengthCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

/// Separators tried, in order, when a semantic chunk is still over budget.
const FALLBACK_SEPARATORS: [&str; 2] = ["\n", " "];

/// How many characters per budget unit the character fallback scans for a cut point.
const CHAR_SCAN_FACTOR: usize = 8;

fn split_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: LengthCounter,
) -> Vec<Chunk> {
    let overlap = overlap.min(chunk_size.saturating_sub(1));
    // New material per chunk, leaving room for the overlap carried from the previous one.
    let budget = chunk_size - overlap;

    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        budget,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let mut base_chunks = Vec::new();
    for chunk in chunker.chunk(text) {
        fit_to_budget(&chunk, budget, &counter, 0, &mut base_chunks);
    }
    base_chunks.retain(|chunk| !chunk.trim().is_empty());
    let spans = locate_spans(text, &base_chunks);

    let mut offsets = CharOffsets::default();
    let mut chunks = Vec::with_capacity(base_chunks.len());
    let mut previous: Option<(usize, usize)> = None;

    for (base, span) in base_chunks.iter().zip(spans) {
        let Some((start, end)) = span else {
            // Chunk text is not a verbatim slice; keep it as produced and anchor at the cursor.
            let anchor = previous.map(|(_, prev_end)| prev_end).unwrap_or(0);
            chunks.push(Chunk {
                text: base.trim().to_string(),
                start_index: offsets.char_offset(text, anchor),
            });
            previous = None;
            continue;
        };

        let begin = match previous {
            Some((prev_start, _)) if overlap > 0 => {
                overlap_start(text, prev_start, start, end, overlap, chunk_size, &counter)
            }
            _ => start,
        };

        let slice = &text[begin..end];
        let trimmed = slice.trim_start();
        let trimmed_begin = begin + (slice.len() - trimmed.len());
        chunks.push(Chunk {
            text: trimmed.trim_end().to_string(),
            start_index: offsets.char_offset(text, trimmed_begin),
        });
        previous = Some((start, end));
    }

    chunks
}

/// Push `piece` to `out`, re-splitting it on line breaks, then spaces, then characters until
/// every part fits `budget`.
///
/// Parts keep their trailing separator, so each one is a verbatim slice of `piece`.
fn fit_to_budget(
    piece: &str,
    budget: usize,
    counter: &LengthCounter,
    level: usize,
    out: &mut Vec<String>,
) {
    if counter.as_ref()(piece) <= budget {
        out.push(piece.to_string());
        return;
    }
    let Some(separator) = FALLBACK_SEPARATORS.get(level) else {
        split_by_chars(piece, budget, counter, out);
        return;
    };

    let mut start = 0;
    let mut end = 0;
    for part in piece.split_inclusive(separator) {
        let part_end = end + part.len();
        if counter.as_ref()(&piece[start..part_end]) <= budget {
            end = part_end;
            continue;
        }
        if end > start {
            out.push(piece[start..end].to_string());
        }
        start = end;
        if counter.as_ref()(part) > budget {
            fit_to_budget(part, budget, counter, level + 1, out);
            start = part_end;
        }
        end = part_end;
    }
    if end > start {
        out.push(piece[start..end].to_string());
    }
}

/// Cut a run without separators into the longest prefixes that fit `budget`.
fn split_by_chars(piece: &str, budget: usize, counter: &LengthCounter, out: &mut Vec<String>) {
    let mut rest = piece;
    while !rest.is_empty() {
        let ends: Vec<usize> = rest
            .char_indices()
            .skip(1)
            .map(|(offset, _)| offset)
            .chain(std::iter::once(rest.len()))
            .take(budget.saturating_mul(CHAR_SCAN_FACTOR).max(1))
            .collect();
        let fitting = ends.partition_point(|&end| counter.as_ref()(&rest[..end]) <= budget);
        // A single character always goes out, even when it alone exceeds the budget.
        let cut = fitting
            .checked_sub(1)
            .and_then(|index| ends.get(index))
            .or_else(|| ends.first())
            .copied()
            .unwrap_or(rest.len());
        out.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
}

/// Find each chunk's byte span in `text`, searching forward from the previous match.
fn locate_spans(text: &str, chunks: &[String]) -> Vec<Option<(usize, usize)>> {
    let mut cursor = 0;
    chunks
        .iter()
        .map(|chunk| {
            let found = text[cursor..].find(chunk.as_str())?;
            let start = cursor + found;
            let end = start + chunk.len();
            cursor = end;
            Some((start, end))
        })
        .collect()
}

/// Earliest word start in `[prev_start, start]` whose tail fits both the overlap and the chunk
/// budget.
fn overlap_start(
    text: &str,
    prev_start: usize,
    start: usize,
    end: usize,
    overlap: usize,
    chunk_size: usize,
    counter: &LengthCounter,
) -> usize {
    let mut after_space = text[..prev_start]
        .chars()
        .next_back()
        .is_none_or(char::is_whitespace);
    let mut candidates = Vec::new();
    for (offset, ch) in text[prev_start..start].char_indices() {
        if after_space && !ch.is_whitespace() {
            candidates.push(prev_start + offset);
        }
        after_space = ch.is_whitespace();
    }
    candidates.push(start);

    let fits = |candidate: usize| {
        counter.as_ref()(text[candidate..start].trim()) <= overlap
            && counter.as_ref()(text[candidate..end].trim()) <= chunk_size
    };
    let first_fit = candidates.partition_point(|&candidate| !fits(candidate));
    candidates.get(first_fit).copied().unwrap_or(start)
}

/// Converts byte offsets into character offsets without rescanning from the start.
#[derive(Default)]
struct CharOffsets {
    byte: usize,
    chars: usize,
}

impl CharOffsets {
    fn char_offset(&mut self, text: &str, byte: usize) -> usize {
        if byte >= self.byte {
            self.chars += text[self.byte..byte].chars().count();
        } else {
            self.chars -= text[byte..self.byte].chars().count();
        }
        self.byte = byte;
        self.chars
    }
}
