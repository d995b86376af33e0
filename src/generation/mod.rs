//! Answer synthesis through chat-completion providers.
//!
//! The retrieval pipeline hands a fully formatted prompt to a [`CompletionClient`]. Two adapters
//! exist: an OpenAI-compatible `/chat/completions` client and an Ollama `/api/generate` client.
//! Both issue HTTP requests directly with `reqwest`.

mod ollama;
mod openai;
pub mod prompt;

pub use ollama::OllamaCompletionClient;
pub use openai::OpenAiCompletionClient;

use crate::config::{Config, LlmProvider, get_config};
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum CompletionClientError {
    /// Provider was unreachable or misconfigured.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Request payload passed to the completion provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// Prompt assembled from retrieved context and the question.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Interface implemented by answer-generation providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate a completion for the supplied prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionClientError>;
}

/// Build a completion client for the given configuration.
pub fn build_completion_client(
    config: &Config,
) -> Result<Box<dyn CompletionClient>, CompletionClientError> {
    match config.llm_provider {
        LlmProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                CompletionClientError::ProviderUnavailable("OPENAI_API_KEY is not set".into())
            })?;
            Ok(Box::new(OpenAiCompletionClient::new(
                config.openai_base_url.clone(),
                api_key,
            )?))
        }
        LlmProvider::Ollama => Ok(Box::new(OllamaCompletionClient::new(
            config.ollama_url.clone(),
        )?)),
    }
}

/// Build a completion client from the global configuration.
pub fn get_completion_client() -> Result<Box<dyn CompletionClient>, CompletionClientError> {
    build_completion_client(get_config())
}
