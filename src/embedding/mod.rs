//! Embedding client abstraction and adapters.
//!
//! Three backends implement [`EmbeddingClient`]: the hosted OpenAI embeddings API, a local Ollama
//! runtime, and a deterministic hashing embedder for offline runs.

mod hashing;
mod ollama;
mod openai;

pub use hashing::HashingEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

use crate::config::{Config, EmbeddingProvider, get_config};
use async_trait::async_trait;
use thiserror::Error;

/// Largest number of inputs sent to a provider in one request.
pub(crate) const MAX_BATCH_SIZE: usize = 256;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached or is missing credentials.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider response could not be decoded.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// A returned vector does not have the configured dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the collection.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Embed a single text, typically a user question.
pub async fn embed_one(
    client: &dyn EmbeddingClient,
    text: &str,
) -> Result<Vec<f32>, EmbeddingClientError> {
    client
        .generate_embeddings(vec![text.to_string()])
        .await?
        .pop()
        .ok_or_else(|| EmbeddingClientError::InvalidResponse("provider returned no vectors".into()))
}

/// Verify that every vector has the expected dimension.
pub fn ensure_dimension(
    vectors: &[Vec<f32>],
    expected: usize,
) -> Result<(), EmbeddingClientError> {
    match vectors.iter().find(|vector| vector.len() != expected) {
        Some(vector) => Err(EmbeddingClientError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        None => Ok(()),
    }
}

/// Build an embedding client for the given configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    let client: Box<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                EmbeddingClientError::ProviderUnavailable("OPENAI_API_KEY is not set".into())
            })?;
            Box::new(OpenAiEmbeddingClient::new(
                config.openai_base_url.clone(),
                api_key,
                config.embedding_model.clone(),
            )?)
        }
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
        )?),
        EmbeddingProvider::Local => {
            Box::new(HashingEmbeddingClient::new(config.embedding_dimension))
        }
    };
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Embedding client initialized"
    );
    Ok(client)
}

/// Build an embedding client suitable for the current global configuration.
pub fn get_embedding_client() -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    build_embedding_client(get_config())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_dimension_reports_first_mismatch() {
        let vectors = vec![vec![0.0; 4], vec![0.0; 3]];
        let error = ensure_dimension(&vectors, 4).unwrap_err();
        assert!(matches!(
            error,
            EmbeddingClientError::DimensionMismatch { expected: 4, actual: 3 }
        ));
        assert!(ensure_dimension(&vectors[..1], 4).is_ok());
    }

    #[tokio::test]
    async fn embed_one_returns_single_vector() {
        let client = HashingEmbeddingClient::new(8);
        let vector = embed_one(&client, "apple").await.expect("vector");
        assert_eq!(vector.len(), 8);
    }
}
