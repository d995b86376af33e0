//! Document pipeline: upload validation, chunking, indexing, retrieval and answering.

pub mod chunking;
mod mappers;
pub mod retrieval;
mod service;
pub mod types;
pub mod upload;

pub use service::{NO_MATCH_ANSWER, PipelineSettings, RagApi, RagService, SourceDocument};
pub use types::{
    ChunkingError, IngestOutcome, LoadedDocument, PipelineError, QdrantHealthSnapshot,
    QueryAnswer, SourceSnippet, UploadError,
};
