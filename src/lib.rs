#![deny(missing_docs)]

//! Core library for the docqa document question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Token and cost estimation.
pub mod cost;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Answer generation through language models.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Document processing and question answering.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Vector similarity helpers.
pub mod similarity;
