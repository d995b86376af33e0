use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    last_chunk_size: AtomicU64,
    queries_answered: AtomicU64,
    queries_unmatched: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed document, its chunk count, and the chunk size used.
    pub fn record_document(&self, chunk_count: u64, chunk_size: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_size.store(chunk_size, Ordering::Relaxed);
    }

    /// Record a question answered by the language model.
    pub fn record_answer(&self) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a question for which no chunk cleared the relevance threshold.
    pub fn record_unmatched(&self) {
        self.queries_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_chunk_size = match self.last_chunk_size.load(Ordering::Relaxed) {
            0 => None,
            value => Some(value),
        };
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            last_chunk_size,
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            queries_unmatched: self.queries_unmatched.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents that have been indexed since startup.
    pub documents_indexed: u64,
    /// Total chunk count produced across all indexed documents.
    pub chunks_indexed: u64,
    /// Chunk size used by the most recent ingestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_size: Option<u64>,
    /// Questions answered by the language model.
    pub queries_answered: u64,
    /// Questions rejected for lack of a relevant chunk.
    pub queries_unmatched: u64,
}
