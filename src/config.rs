use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the document QA server and CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection holding the indexed document.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Provider used to synthesize answers.
    pub llm_provider: LlmProvider,
    /// Chat model identifier passed to the completion provider.
    pub llm_model: String,
    /// Sampling temperature for answer generation.
    pub llm_temperature: f32,
    /// API key for OpenAI-compatible endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible endpoints.
    pub openai_base_url: String,
    /// Base URL of a local Ollama runtime.
    pub ollama_url: String,
    /// Maximum chunk length, in `text_splitter_length_unit`s.
    pub text_splitter_chunk_size: usize,
    /// Overlap carried from the previous chunk, in `text_splitter_length_unit`s.
    pub text_splitter_chunk_overlap: usize,
    /// Unit used to measure chunk length.
    pub text_splitter_length_unit: LengthUnit,
    /// Number of chunks retrieved per question.
    pub search_top_k: usize,
    /// Minimum relevance of the best chunk before the LLM is consulted.
    pub search_min_relevance: f32,
    /// Retrieval strategy applied to the vector index.
    pub search_strategy: SearchStrategy,
    /// Candidate pool size fetched before MMR reranking.
    pub search_mmr_fetch_k: usize,
    /// MMR trade-off between relevance (1.0) and diversity (0.0).
    pub search_mmr_lambda: f32,
    /// Largest accepted upload, in bytes.
    pub upload_max_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Deterministic in-process hashing embedder (offline use).
    Local,
}

/// Supported answer-generation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Hosted OpenAI chat completions (or any compatible endpoint).
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// How chunk sizes and overlaps are measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Unicode scalar values.
    Chars,
    /// Tokenizer tokens for the embedding model.
    Tokens,
}

/// Retrieval strategy for similarity search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Plain top-k by cosine similarity.
    Similarity,
    /// Maximal marginal relevance reranking over a larger candidate pool.
    Mmr,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: parse_required("EMBEDDING_PROVIDER")?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: parse_required("EMBEDDING_DIMENSION")?,
            llm_provider: parse_optional("LLM_PROVIDER")?.unwrap_or(LlmProvider::OpenAI),
            llm_model: load_env_optional("LLM_MODEL")
                .unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
            llm_temperature: parse_optional("LLM_TEMPERATURE")?.unwrap_or(0.0),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            text_splitter_chunk_size: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?.unwrap_or(1000),
            text_splitter_chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(200),
            text_splitter_length_unit: parse_optional("TEXT_SPLITTER_LENGTH_UNIT")?
                .unwrap_or(LengthUnit::Chars),
            search_top_k: parse_optional("SEARCH_TOP_K")?.unwrap_or(3),
            search_min_relevance: parse_optional("SEARCH_MIN_RELEVANCE")?.unwrap_or(0.7),
            search_strategy: parse_optional("SEARCH_STRATEGY")?
                .unwrap_or(SearchStrategy::Similarity),
            search_mmr_fetch_k: parse_optional("SEARCH_MMR_FETCH_K")?.unwrap_or(20),
            search_mmr_lambda: parse_optional("SEARCH_MMR_LAMBDA")?.unwrap_or(0.5),
            upload_max_bytes: parse_optional("UPLOAD_MAX_BYTES")?.unwrap_or(2 * 1024 * 1024),
            server_port: parse_optional("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        if self.search_top_k == 0 {
            return Err(ConfigError::InvalidValue("SEARCH_TOP_K".into()));
        }
        if !(0.0..=1.0).contains(&self.search_mmr_lambda) {
            return Err(ConfigError::InvalidValue("SEARCH_MMR_LAMBDA".into()));
        }
        Ok(())
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_required<T: std::str::FromStr>(key: &str) -> Result<T, ConfigError> {
    load_env(key)?
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LengthUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Chars),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for SearchStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "similarity" => Ok(Self::Similarity),
            "mmr" => Ok(Self::Mmr),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        server_port = ?config.server_port,
        embedding_provider = ?config.embedding_provider,
        llm_provider = ?config.llm_provider,
        llm_model = %config.llm_model,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("OpenAI".parse(), Ok(EmbeddingProvider::OpenAI));
        assert_eq!("local".parse(), Ok(EmbeddingProvider::Local));
        assert_eq!("OLLAMA".parse(), Ok(LlmProvider::Ollama));
        assert!("chroma".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn length_unit_accepts_long_form() {
        assert_eq!("characters".parse(), Ok(LengthUnit::Chars));
        assert_eq!("tokens".parse(), Ok(LengthUnit::Tokens));
    }

    #[test]
    fn search_strategy_rejects_unknown_names() {
        assert_eq!("mmr".parse(), Ok(SearchStrategy::Mmr));
        assert!("hybrid".parse::<SearchStrategy>().is_err());
    }
}
