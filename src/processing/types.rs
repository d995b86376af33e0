//! Core data types and error definitions for the processing pipeline.

use crate::{
    embedding::EmbeddingClientError, generation::CompletionClientError, qdrant::QdrantError,
};
use anyhow::Error as TokenizerError;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible length budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model we attempted to load a tokenizer for.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Reasons an uploaded file is rejected before processing.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The multipart form did not contain a `file` field.
    #[error("No file provided")]
    MissingFile,
    /// File name does not end in `.md`.
    #[error("Only Markdown (.md) files are supported")]
    UnsupportedType,
    /// File exceeds the configured upload limit.
    #[error("File size must be under {limit}")]
    TooLarge {
        /// Human-readable limit such as `2MB` or `3.5MB`.
        limit: String,
    },
    /// File content is not valid UTF-8.
    #[error("File must be UTF-8 encoded text")]
    InvalidEncoding,
    /// The multipart body could not be read.
    #[error("Failed to read upload: {0}")]
    Malformed(String),
}

/// Errors emitted by the ingestion and question-answering pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Upload failed validation.
    #[error(transparent)]
    Upload(#[from] UploadError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// The document produced no chunks.
    #[error("Document contains no text to index")]
    EmptyDocument,
    /// A question arrived before any document was indexed.
    #[error("No document uploaded. Please upload a document first.")]
    NoDocument,
    /// The question was empty or whitespace.
    #[error("Query cannot be empty")]
    EmptyQuery,
    /// Embedding provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Completion provider failed.
    #[error(transparent)]
    Completion(#[from] CompletionClientError),
    /// Qdrant interaction failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
}

impl PipelineError {
    /// Whether the error stems from caller input rather than a backend failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Upload(_) | Self::EmptyDocument | Self::NoDocument | Self::EmptyQuery
        )
    }
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Name of the ingested file, or the label of a multi-file ingestion.
    pub filename: String,
    /// Number of source documents processed.
    pub document_count: usize,
    /// Number of chunks stored in the index.
    pub chunk_count: usize,
    /// Chunks dropped because their text repeated an earlier chunk.
    pub skipped_duplicates: usize,
    /// Chunk size used during splitting.
    pub chunk_size: usize,
    /// Text of the eleventh chunk, when there is one.
    pub sample_chunk: Option<String>,
}

/// The document currently available for questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedDocument {
    /// Name of the uploaded file, or the collection name when restored at startup.
    pub filename: String,
    /// Number of chunks stored in the index.
    pub chunk_count: usize,
    /// RFC 3339 timestamp of when the document became available.
    pub loaded_at: String,
}

/// A retrieved chunk quoted back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSnippet {
    /// Chunk text, truncated for display.
    pub content: String,
    /// Relevance score reported by the index.
    pub score: f32,
    /// Chunk metadata (`source`, `start_index`).
    pub metadata: Map<String, Value>,
}

/// Answer produced for a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnswer {
    /// Synthesized answer or the no-match message.
    pub answer: String,
    /// Supporting chunks, most relevant first.
    pub sources: Vec<SourceSnippet>,
}

/// Reachability and readiness snapshot for Qdrant.
#[derive(Debug, Clone, Serialize)]
pub struct QdrantHealthSnapshot {
    /// Indicates whether the Qdrant HTTP endpoint responded successfully.
    pub reachable: bool,
    /// Whether the configured collection is currently present.
    pub collection_present: bool,
    /// Diagnostic string captured when Qdrant is unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_client_errors() {
        assert!(PipelineError::from(UploadError::UnsupportedType).is_client_error());
        assert!(PipelineError::NoDocument.is_client_error());
        assert!(PipelineError::EmptyQuery.is_client_error());
        assert!(
            !PipelineError::from(CompletionClientError::GenerationFailed("boom".into()))
                .is_client_error()
        );
    }

    #[test]
    fn too_large_message_names_limit() {
        let error = UploadError::TooLarge {
            limit: "2MB".into(),
        };
        assert_eq!(error.to_string(), "File size must be under 2MB");
    }
}
