//! Token and price estimates for ingestion and querying.
//!
//! Prices are USD per 1K tokens. Unknown embedding models are priced as `text-embedding-3-small`
//! and unknown chat models as `gpt-3.5-turbo`.

use crate::generation::prompt::template_overhead;
use crate::processing::chunking::resolve_encoding;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Default tokenizer for estimates.
pub const DEFAULT_ENCODING: &str = "cl100k_base";
/// Output length assumed for a typical answer.
pub const ESTIMATED_OUTPUT_TOKENS: usize = 150;

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

const EMBEDDING_PRICES: &[(&str, f64)] = &[
    ("text-embedding-3-small", 0.00002),
    ("text-embedding-3-large", 0.00013),
];

const CHAT_PRICES: &[(&str, ChatPrice)] = &[
    ("gpt-3.5-turbo", ChatPrice { input: 0.0005, output: 0.0015 }),
    ("gpt-4", ChatPrice { input: 0.03, output: 0.06 }),
    ("gpt-4-turbo", ChatPrice { input: 0.01, output: 0.03 }),
];

/// Errors raised while estimating costs.
#[derive(Debug, Error)]
pub enum CostError {
    /// Tokenizer could not be loaded.
    #[error("failed to load tokenizer '{encoding}': {message}")]
    Tokenizer {
        /// Encoding or model requested.
        encoding: String,
        /// Library error text.
        message: String,
    },
    /// Data directory does not exist.
    #[error("directory not found: {0}")]
    MissingDirectory(PathBuf),
    /// A markdown file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Per-1K-token prices for a chat model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChatPrice {
    /// Input price.
    pub input: f64,
    /// Output price.
    pub output: f64,
}

/// Coarse classification of an estimated spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    /// Under $0.001.
    VeryLow,
    /// Under $0.01.
    Low,
    /// Under $0.10.
    Moderate,
    /// $0.10 or more.
    High,
}

impl CostTier {
    /// Classify a cost in USD.
    pub fn classify(cost: f64) -> Self {
        if cost < 0.001 {
            Self::VeryLow
        } else if cost < 0.01 {
            Self::Low
        } else if cost < 0.10 {
            Self::Moderate
        } else {
            Self::High
        }
    }

    /// Short advice printed next to an estimate.
    pub fn advice(self) -> &'static str {
        match self {
            Self::VeryLow => "Very low cost - safe to proceed",
            Self::Low => "Low cost - proceed with confidence",
            Self::Moderate => "Moderate cost - review before proceeding",
            Self::High => "High cost - consider a different chunking strategy or shorter queries",
        }
    }
}

/// Count tokens in `text` with the named encoding or model tokenizer.
pub fn count_tokens(text: &str, encoding: &str) -> Result<usize, CostError> {
    let bpe = resolve_encoding(encoding).map_err(|error| CostError::Tokenizer {
        encoding: encoding.to_string(),
        message: error.to_string(),
    })?;
    Ok(bpe.encode_ordinary(text).len())
}

/// Embedding price per 1K tokens.
pub fn embedding_price(model: &str) -> f64 {
    lookup(EMBEDDING_PRICES, model)
        .or_else(|| lookup(EMBEDDING_PRICES, DEFAULT_EMBEDDING_MODEL))
        .unwrap_or_default()
}

/// Chat price per 1K tokens, with the model the price belongs to.
pub fn chat_price(model: &str) -> (&'static str, ChatPrice) {
    CHAT_PRICES
        .iter()
        .find(|(name, _)| *name == model)
        .or_else(|| CHAT_PRICES.iter().find(|(name, _)| *name == DEFAULT_CHAT_MODEL))
        .map(|(name, price)| (*name, *price))
        .unwrap_or((DEFAULT_CHAT_MODEL, ChatPrice { input: 0.0, output: 0.0 }))
}

fn lookup<T: Copy>(table: &[(&str, T)], model: &str) -> Option<T> {
    table
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, price)| *price)
}

/// Cost of embedding `tokens` tokens with `model`.
pub fn embedding_cost(tokens: usize, model: &str) -> f64 {
    tokens as f64 / 1000.0 * embedding_price(model)
}

/// Token count for one markdown file.
#[derive(Debug, Clone, Serialize)]
pub struct FileTokens {
    /// File path.
    pub path: PathBuf,
    /// Token count.
    pub tokens: usize,
}

/// Estimate for indexing a directory of markdown files.
#[derive(Debug, Clone, Serialize)]
pub struct IngestEstimate {
    /// Per-file token counts, sorted by path.
    pub files: Vec<FileTokens>,
    /// Sum over all files.
    pub total_tokens: usize,
    /// Chunks expected from the splitter.
    pub estimated_chunks: usize,
    /// Embedding model priced.
    pub model: String,
    /// Embedding cost in USD.
    pub embedding_cost: f64,
    /// Cost tier of the estimate.
    pub tier: CostTier,
}

/// Chunks expected for `total_tokens`: `max(1, tokens / (chunk_size - overlap))`.
pub fn estimate_chunks(total_tokens: usize, chunk_size: usize, overlap: usize) -> usize {
    let stride = chunk_size.saturating_sub(overlap).max(1);
    (total_tokens / stride).max(1)
}

/// Collect every `*.md` file below `dir`, sorted by path.
pub fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>, CostError> {
    if !dir.is_dir() {
        return Err(CostError::MissingDirectory(dir.to_path_buf()));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Estimate the cost of indexing all markdown files below `dir`.
pub fn estimate_ingest(
    dir: &Path,
    model: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<IngestEstimate, CostError> {
    let mut files = Vec::new();
    for path in markdown_files(dir)? {
        let text = std::fs::read_to_string(&path).map_err(|source| CostError::Io {
            path: path.clone(),
            source,
        })?;
        let tokens = count_tokens(&text, DEFAULT_ENCODING)?;
        tracing::debug!(path = %path.display(), tokens, "Counted file tokens");
        files.push(FileTokens { path, tokens });
    }

    let total_tokens = files.iter().map(|file| file.tokens).sum();
    let embedding_cost = embedding_cost(total_tokens, model);
    Ok(IngestEstimate {
        files,
        total_tokens,
        estimated_chunks: estimate_chunks(total_tokens, chunk_size, overlap),
        model: model.to_string(),
        embedding_cost,
        tier: CostTier::classify(embedding_cost),
    })
}

/// Token breakdown for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryTokens {
    /// Tokens in the question.
    pub query: usize,
    /// Retrieved context, assumed to fill `k` whole chunks.
    pub context: usize,
    /// Prompt template overhead.
    pub template: usize,
    /// Sum of the above.
    pub input: usize,
    /// Assumed answer length.
    pub output: usize,
    /// Input plus output.
    pub total: usize,
}

/// Cost estimate for one question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryEstimate {
    /// Token breakdown.
    pub tokens: QueryTokens,
    /// Chat model priced.
    pub model: String,
    /// Input cost in USD.
    pub input_cost: f64,
    /// Output cost in USD.
    pub output_cost: f64,
    /// Cost of embedding the question.
    pub embedding_cost: f64,
    /// LLM plus embedding cost.
    pub total_cost: f64,
    /// Cost tier of `total_cost`.
    pub tier: CostTier,
}

impl QueryEstimate {
    /// Questions affordable with one dollar; `None` when the cost is zero.
    pub fn queries_per_dollar(&self) -> Option<f64> {
        (self.total_cost > 0.0).then(|| 1.0 / self.total_cost)
    }

    /// Cost of `count` questions.
    pub fn cost_for(&self, count: usize) -> f64 {
        self.total_cost * count as f64
    }
}

/// Estimate the token usage of a question with `k` context chunks of `chunk_size` tokens.
pub fn estimate_query_tokens(
    query: &str,
    k: usize,
    chunk_size: usize,
) -> Result<QueryTokens, CostError> {
    let query_tokens = count_tokens(query, DEFAULT_ENCODING)?;
    let template = count_tokens(&template_overhead(), DEFAULT_ENCODING)?;
    let context = k * chunk_size;
    let input = query_tokens + context + template;
    Ok(QueryTokens {
        query: query_tokens,
        context,
        template,
        input,
        output: ESTIMATED_OUTPUT_TOKENS,
        total: input + ESTIMATED_OUTPUT_TOKENS,
    })
}

/// Estimate the cost of answering `query` with `model`.
pub fn estimate_query(
    query: &str,
    model: &str,
    k: usize,
    chunk_size: usize,
) -> Result<QueryEstimate, CostError> {
    let tokens = estimate_query_tokens(query, k, chunk_size)?;
    let (priced_model, price) = chat_price(model);
    let input_cost = tokens.input as f64 / 1000.0 * price.input;
    let output_cost = tokens.output as f64 / 1000.0 * price.output;
    let embedding_cost = embedding_cost(tokens.query, DEFAULT_EMBEDDING_MODEL);
    let total_cost = input_cost + output_cost + embedding_cost;
    Ok(QueryEstimate {
        tokens,
        model: priced_model.to_string(),
        input_cost,
        output_cost,
        embedding_cost,
        total_cost,
        tier: CostTier::classify(total_cost),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(CostTier::classify(0.0), CostTier::VeryLow);
        assert_eq!(CostTier::classify(0.0009), CostTier::VeryLow);
        assert_eq!(CostTier::classify(0.001), CostTier::Low);
        assert_eq!(CostTier::classify(0.05), CostTier::Moderate);
        assert_eq!(CostTier::classify(0.10), CostTier::High);
    }

    #[test]
    fn unknown_models_fall_back_to_defaults() {
        assert_eq!(embedding_price("mystery"), 0.00002);
        assert_eq!(embedding_price("text-embedding-3-large"), 0.00013);
        let (model, price) = chat_price("mystery");
        assert_eq!(model, "gpt-3.5-turbo");
        assert_eq!(price.input, 0.0005);
        assert_eq!(chat_price("gpt-4").1.output, 0.06);
    }

    #[test]
    fn chunk_estimate_uses_stride_and_floor_of_one() {
        assert_eq!(estimate_chunks(8000, 1000, 200), 10);
        assert_eq!(estimate_chunks(10, 1000, 200), 1);
        assert_eq!(estimate_chunks(500, 100, 100), 500);
    }

    #[test]
    fn embedding_cost_scales_per_thousand_tokens() {
        let cost = embedding_cost(50_000, "text-embedding-3-small");
        assert!((cost - 0.001).abs() < 1e-12);
    }

    #[test]
    fn query_estimate_adds_llm_and_embedding_costs() {
        let estimate = estimate_query("Who is Alice?", "gpt-3.5-turbo", 3, 1000).expect("estimate");
        assert_eq!(estimate.tokens.context, 3000);
        assert_eq!(estimate.tokens.output, ESTIMATED_OUTPUT_TOKENS);
        assert_eq!(
            estimate.tokens.input,
            estimate.tokens.query + estimate.tokens.context + estimate.tokens.template
        );
        assert!(estimate.tokens.query > 0 && estimate.tokens.template > 0);
        let expected = estimate.input_cost + estimate.output_cost + estimate.embedding_cost;
        assert!((estimate.total_cost - expected).abs() < 1e-12);
        assert_eq!(estimate.tier, CostTier::Low);
        assert!((estimate.cost_for(100) - estimate.total_cost * 100.0).abs() < 1e-12);
        assert!(estimate.queries_per_dollar().expect("non-zero") > 1.0);
    }

    #[test]
    fn ingest_estimate_reads_markdown_recursively() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.md"), "Alice was beginning to get very tired.")
            .expect("write a");
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");
        std::fs::write(dir.path().join("nested/b.MD"), "Down the rabbit hole.").expect("write b");
        std::fs::write(dir.path().join("skip.txt"), "ignored").expect("write txt");

        let estimate =
            estimate_ingest(dir.path(), "text-embedding-3-small", 1000, 200).expect("estimate");
        assert_eq!(estimate.files.len(), 2);
        assert_eq!(
            estimate.total_tokens,
            estimate.files.iter().map(|file| file.tokens).sum::<usize>()
        );
        assert_eq!(estimate.estimated_chunks, 1);
        assert_eq!(estimate.tier, CostTier::VeryLow);
    }

    #[test]
    fn missing_directory_is_reported() {
        let error = estimate_ingest(Path::new("/definitely/not/here"), "m", 1000, 200).unwrap_err();
        assert!(matches!(error, CostError::MissingDirectory(_)));
    }
}
