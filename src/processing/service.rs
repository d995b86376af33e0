//! Retrieval-augmented question answering over a single loaded document.

use crate::{
    config::{Config, get_config},
    embedding::{EmbeddingClient, embed_one, ensure_dimension, get_embedding_client},
    generation::{
        CompletionClient, CompletionRequest, get_completion_client,
        prompt::{build_context, build_prompt},
    },
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::{ChunkingOptions, split_text},
        mappers::{PreparedChunk, dedupe_chunks, to_source_snippet},
        retrieval::{RetrievalOptions, retrieve},
        types::{
            IngestOutcome, LoadedDocument, PipelineError, QdrantHealthSnapshot, QueryAnswer,
        },
    },
    qdrant::{PointInsert, QdrantService, payload::current_timestamp_rfc3339},
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Answer returned when no chunk clears the relevance threshold.
pub const NO_MATCH_ANSWER: &str =
    "Unable to find relevant information in the document to answer your question.";

/// Position of the chunk echoed back as a sample after ingestion.
const SAMPLE_CHUNK_INDEX: usize = 10;

/// Tunables for ingestion and retrieval, normally derived from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Qdrant collection holding the current document.
    pub collection: String,
    /// Dimension every embedding must have.
    pub embedding_dimension: usize,
    /// Splitter parameters.
    pub chunking: ChunkingOptions,
    /// Retrieval parameters.
    pub retrieval: RetrievalOptions,
    /// Minimum top relevance score required before the language model is consulted.
    pub min_relevance: f32,
    /// Completion model name.
    pub llm_model: String,
    /// Completion sampling temperature.
    pub llm_temperature: f32,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
}

impl PipelineSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.qdrant_collection_name.clone(),
            embedding_dimension: config.embedding_dimension,
            chunking: ChunkingOptions {
                chunk_size: config.text_splitter_chunk_size,
                chunk_overlap: config.text_splitter_chunk_overlap,
                unit: config.text_splitter_length_unit,
                model: config.embedding_model.clone(),
            },
            retrieval: RetrievalOptions {
                strategy: config.search_strategy,
                k: config.search_top_k,
                fetch_k: config.search_mmr_fetch_k,
                lambda: config.search_mmr_lambda,
            },
            min_relevance: config.search_min_relevance,
            llm_model: config.llm_model.clone(),
            llm_temperature: config.llm_temperature,
            max_upload_bytes: config.upload_max_bytes,
        }
    }
}

/// A markdown document handed to ingestion.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Name recorded as the `source` of every chunk.
    pub source: String,
    /// Document text.
    pub text: String,
}

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Replace the indexed document with `text`.
    async fn ingest_document(
        &self,
        filename: &str,
        text: String,
    ) -> Result<IngestOutcome, PipelineError>;

    /// Answer a question against the loaded document.
    async fn answer_query(&self, query: &str) -> Result<QueryAnswer, PipelineError>;

    /// The document currently available for questions.
    async fn loaded_document(&self) -> Option<LoadedDocument>;

    /// Probe the vector index.
    async fn qdrant_health(&self) -> QdrantHealthSnapshot;

    /// Retrieve the current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;

    /// Largest accepted upload in bytes.
    fn max_upload_bytes(&self) -> usize;
}

/// Coordinates chunking, embedding, Qdrant writes, retrieval and answer generation.
///
/// Construct once near process start and share through an `Arc`. Ingestion holds the index lock
/// exclusively, so a collection is never recreated while another upload is writing to it or a
/// query is searching it.
pub struct RagService {
    settings: PipelineSettings,
    embedding_client: Box<dyn EmbeddingClient>,
    completion_client: Box<dyn CompletionClient>,
    qdrant: QdrantService,
    metrics: Arc<PipelineMetrics>,
    index_lock: RwLock<()>,
    loaded: RwLock<Option<LoadedDocument>>,
}

impl RagService {
    /// Build the service from the global configuration.
    pub fn new() -> Result<Self, PipelineError> {
        let config = get_config();
        tracing::info!("Initializing embedding client");
        let embedding_client = get_embedding_client()?;
        let completion_client = get_completion_client()?;
        let qdrant = QdrantService::from_config()?;
        Ok(Self::with_components(
            PipelineSettings::from_config(config),
            embedding_client,
            completion_client,
            qdrant,
        ))
    }

    /// Build the service from explicit parts.
    pub fn with_components(
        settings: PipelineSettings,
        embedding_client: Box<dyn EmbeddingClient>,
        completion_client: Box<dyn CompletionClient>,
        qdrant: QdrantService,
    ) -> Self {
        Self {
            settings,
            embedding_client,
            completion_client,
            qdrant,
            metrics: Arc::new(PipelineMetrics::new()),
            index_lock: RwLock::new(()),
            loaded: RwLock::new(None),
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Chunk, embed and index an uploaded document, replacing whatever was indexed before.
    pub async fn ingest_document(
        &self,
        filename: &str,
        text: String,
    ) -> Result<IngestOutcome, PipelineError> {
        let document = SourceDocument {
            source: filename.to_string(),
            text,
        };
        self.ingest_sources(filename, vec![document]).await
    }

    /// Index several documents into one fresh collection under a single label.
    pub async fn ingest_sources(
        &self,
        label: &str,
        documents: Vec<SourceDocument>,
    ) -> Result<IngestOutcome, PipelineError> {
        let _guard = self.index_lock.write().await;
        tracing::info!(
            label,
            documents = documents.len(),
            collection = %self.settings.collection,
            "Processing upload"
        );

        match self.index_documents(label, documents).await {
            Ok(outcome) => {
                *self.loaded.write().await = Some(LoadedDocument {
                    filename: label.to_string(),
                    chunk_count: outcome.chunk_count,
                    loaded_at: current_timestamp_rfc3339(),
                });
                Ok(outcome)
            }
            Err(error) => {
                tracing::error!(label, error = %error, "Ingestion failed");
                *self.loaded.write().await = None;
                Err(error)
            }
        }
    }

    async fn index_documents(
        &self,
        label: &str,
        documents: Vec<SourceDocument>,
    ) -> Result<IngestOutcome, PipelineError> {
        let chunking = &self.settings.chunking;
        let document_count = documents.len();
        let mut seen = HashSet::new();
        let mut prepared: Vec<(String, PreparedChunk)> = Vec::new();
        let mut skipped_duplicates = 0;

        for SourceDocument { source, text } in documents {
            let chunks = split_text(&text, chunking)?;
            tracing::debug!(
                source = %source,
                chunks = chunks.len(),
                chunk_size = chunking.chunk_size,
                overlap = chunking.chunk_overlap,
                unit = ?chunking.unit,
                "Split document"
            );
            let (unique, skipped) = dedupe_chunks(chunks, &mut seen);
            skipped_duplicates += skipped;
            prepared.extend(unique.into_iter().map(|chunk| (source.clone(), chunk)));
        }

        if prepared.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        let sample_chunk = prepared
            .get(SAMPLE_CHUNK_INDEX)
            .map(|(_, chunk)| chunk.text.clone());
        let texts: Vec<String> = prepared.iter().map(|(_, chunk)| chunk.text.clone()).collect();
        let embeddings = self.embedding_client.generate_embeddings(texts).await?;
        ensure_dimension(&embeddings, self.settings.embedding_dimension)?;
        debug_assert_eq!(prepared.len(), embeddings.len());

        let points: Vec<PointInsert> = prepared
            .into_iter()
            .zip(embeddings)
            .map(|((source, chunk), vector)| PointInsert {
                text: chunk.text,
                chunk_hash: chunk.chunk_hash,
                source,
                start_index: chunk.start_index,
                vector,
            })
            .collect();

        let collection = &self.settings.collection;
        self.qdrant
            .recreate_collection(collection, self.settings.embedding_dimension as u64)
            .await?;
        let summary = self.qdrant.upsert_points(collection, points).await?;

        let chunk_count = summary.inserted;
        self.metrics
            .record_document(chunk_count as u64, chunking.chunk_size as u64);
        tracing::info!(
            label,
            collection = %collection,
            documents = document_count,
            chunks = chunk_count,
            skipped_duplicates,
            "Document indexed"
        );

        Ok(IngestOutcome {
            filename: label.to_string(),
            document_count,
            chunk_count,
            skipped_duplicates,
            chunk_size: chunking.chunk_size,
            sample_chunk,
        })
    }

    /// Answer a question from the chunks of the loaded document.
    pub async fn answer_query(&self, query: &str) -> Result<QueryAnswer, PipelineError> {
        if self.loaded.read().await.is_none() {
            return Err(PipelineError::NoDocument);
        }
        if query.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let query_vector = embed_one(self.embedding_client.as_ref(), query).await?;
        ensure_dimension(
            std::slice::from_ref(&query_vector),
            self.settings.embedding_dimension,
        )?;

        let results = {
            // Waits out an in-flight upload; it may have replaced or cleared the document.
            let _guard = self.index_lock.read().await;
            if self.loaded.read().await.is_none() {
                return Err(PipelineError::NoDocument);
            }
            retrieve(
                &self.qdrant,
                &self.settings.collection,
                query_vector,
                self.settings.retrieval,
            )
            .await?
        };

        let top_score = results
            .iter()
            .map(|chunk| chunk.score)
            .fold(f32::NEG_INFINITY, f32::max);
        if results.is_empty() || top_score < self.settings.min_relevance {
            tracing::info!(
                results = results.len(),
                top_score = results.first().map(|chunk| chunk.score),
                threshold = self.settings.min_relevance,
                "No chunk cleared the relevance threshold"
            );
            self.metrics.record_unmatched();
            return Ok(QueryAnswer {
                answer: NO_MATCH_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let context = build_context(results.iter().map(|chunk| chunk.text.as_str()));
        let prompt = build_prompt(&context, query);
        tracing::debug!(
            chunks = results.len(),
            top_score,
            prompt_chars = prompt.len(),
            model = %self.settings.llm_model,
            "Requesting completion"
        );
        let answer = self
            .completion_client
            .complete(CompletionRequest {
                model: self.settings.llm_model.clone(),
                prompt,
                temperature: self.settings.llm_temperature,
            })
            .await?;

        self.metrics.record_answer();
        Ok(QueryAnswer {
            answer,
            sources: results.into_iter().map(to_source_snippet).collect(),
        })
    }

    /// The document currently available for questions.
    pub async fn loaded_document(&self) -> Option<LoadedDocument> {
        self.loaded.read().await.clone()
    }

    /// Treat an already-populated collection as the loaded document.
    ///
    /// Lets a restarted server keep answering questions about the last upload.
    pub async fn restore_loaded_document(&self) -> Result<Option<LoadedDocument>, PipelineError> {
        let collection = &self.settings.collection;
        if !self.qdrant.collection_exists(collection).await? {
            tracing::debug!(collection = %collection, "No existing collection to restore");
            return Ok(None);
        }
        let count = self.qdrant.count_points(collection).await?;
        if count == 0 {
            return Ok(None);
        }

        let document = LoadedDocument {
            filename: collection.clone(),
            chunk_count: count as usize,
            loaded_at: current_timestamp_rfc3339(),
        };
        tracing::info!(
            collection = %collection,
            chunks = count,
            "Restored previously indexed document"
        );
        *self.loaded.write().await = Some(document.clone());
        Ok(Some(document))
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Probe Qdrant for reachability and the configured collection.
    pub async fn qdrant_health(&self) -> QdrantHealthSnapshot {
        match self.qdrant.list_collections().await {
            Ok(collections) => QdrantHealthSnapshot {
                reachable: true,
                collection_present: collections
                    .iter()
                    .any(|name| name == &self.settings.collection),
                error: None,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Qdrant health probe failed");
                QdrantHealthSnapshot {
                    reachable: false,
                    collection_present: false,
                    error: Some(error.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest_document(
        &self,
        filename: &str,
        text: String,
    ) -> Result<IngestOutcome, PipelineError> {
        RagService::ingest_document(self, filename, text).await
    }

    async fn answer_query(&self, query: &str) -> Result<QueryAnswer, PipelineError> {
        RagService::answer_query(self, query).await
    }

    async fn loaded_document(&self) -> Option<LoadedDocument> {
        RagService::loaded_document(self).await
    }

    async fn qdrant_health(&self) -> QdrantHealthSnapshot {
        RagService::qdrant_health(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        RagService::metrics_snapshot(self)
    }

    fn max_upload_bytes(&self) -> usize {
        self.settings.max_upload_bytes
    }
}
