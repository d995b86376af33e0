//! Retrieval strategies over the vector index.

use crate::{
    config::SearchStrategy,
    processing::mappers::{RetrievedChunk, map_scored_point},
    qdrant::{QdrantError, QdrantService},
    similarity::{MmrCandidate, mmr_rerank, relevance_from_cosine},
};

/// Parameters for a retrieval call.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    /// Similarity ranking or MMR reranking.
    pub strategy: SearchStrategy,
    /// Number of chunks to return.
    pub k: usize,
    /// Candidate pool size for MMR.
    pub fetch_k: usize,
    /// MMR relevance/diversity trade-off.
    pub lambda: f32,
}

/// Retrieve the chunks most relevant to `query_vector`, most relevant first.
///
/// Qdrant's cosine scores are reported on the [`relevance_from_cosine`] scale. With MMR the
/// returned scores are still the relevance of each chunk to the query.
pub(crate) async fn retrieve(
    qdrant: &QdrantService,
    collection: &str,
    query_vector: Vec<f32>,
    options: RetrievalOptions,
) -> Result<Vec<RetrievedChunk>, QdrantError> {
    let mut chunks = search(qdrant, collection, query_vector, options).await?;
    for chunk in &mut chunks {
        chunk.score = relevance_from_cosine(chunk.score);
    }
    Ok(chunks)
}

async fn search(
    qdrant: &QdrantService,
    collection: &str,
    query_vector: Vec<f32>,
    options: RetrievalOptions,
) -> Result<Vec<RetrievedChunk>, QdrantError> {
    match options.strategy {
        SearchStrategy::Similarity => {
            let points = qdrant
                .search_points(collection, query_vector, options.k, false)
                .await?;
            Ok(points.into_iter().map(map_scored_point).collect())
        }
        SearchStrategy::Mmr => {
            let fetch_k = options.fetch_k.max(options.k);
            let points = qdrant
                .search_points(collection, query_vector.clone(), fetch_k, true)
                .await?;
            tracing::debug!(
                collection,
                candidates = points.len(),
                k = options.k,
                lambda = options.lambda,
                "Reranking with MMR"
            );
            let candidates = points
                .into_iter()
                .map(|mut point| {
                    let vector = point.vector.take().unwrap_or_default();
                    MmrCandidate {
                        item: map_scored_point(point),
                        vector,
                    }
                })
                .collect();
            Ok(mmr_rerank(&query_vector, candidates, options.k, options.lambda))
        }
    }
}
