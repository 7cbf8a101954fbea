//! Capability traits at the seams of the pipeline.
//!
//! - [`Embedder`]: dense text embedding (model loading is external)
//! - [`SparseEmbedder`]: bag-of-tokens keyword weights
//! - [`TokenCounter`]: the embedder's tokenization, shared with the chunker
//! - [`VectorStore`]: hybrid vector storage (database internals are external)
//!
//! These traits let the pipeline be exercised with deterministic in-process
//! implementations while production builds plug in real backends.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{EmbedError, StoreError};
use crate::types::{HybridQuery, ScoredPoint, SparseVector, VectorFilter, VectorPoint};

/// Counts tokens the way the embedding model does.
///
/// The chunker sizes windows with this so chunks never exceed the model's
/// input length by surprise.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Dense output for one input text.
#[derive(Debug, Clone)]
pub struct DenseEmbedding {
    pub vector: Vec<f32>,
    pub token_count: usize,
}

/// Dense text embedding capability.
#[async_trait]
pub trait Embedder: TokenCounter {
    /// Model identifier recorded with chunks.
    fn model_name(&self) -> &str;

    /// Output dimension.
    fn dimension(&self) -> usize;

    /// Bumped when the model (or its preprocessing) changes; a mismatch
    /// against a file's stored version forces re-embedding on the next scan.
    fn embedding_version(&self) -> u32;

    /// Maximum tokens per input.
    fn max_tokens(&self) -> usize;

    /// Embed a batch of document texts.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<DenseEmbedding>, EmbedError>;

    /// Embed a search query (may apply a different instruction prefix).
    async fn embed_query(&self, query: &str) -> Result<DenseEmbedding, EmbedError> {
        let mut out = self.embed_batch(&[query]).await?;
        out.pop()
            .ok_or_else(|| EmbedError::Inference("empty embedding result".to_string()))
    }
}

/// Sparse keyword-weight embedding capability.
pub trait SparseEmbedder: Send + Sync {
    fn embed_batch(&self, texts: &[&str]) -> Vec<SparseVector>;

    fn embed_query(&self, query: &str) -> SparseVector {
        self.embed_batch(&[query]).into_iter().next().unwrap_or_default()
    }
}

/// Hybrid dense + sparse vector storage.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn init(&self) -> Result<(), StoreError>;

    /// Insert or replace points. Idempotent by point id.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), StoreError>;

    /// Remove every point matching the filter; returns the count removed.
    async fn delete_by_filter(&self, filter: &VectorFilter) -> Result<u64, StoreError>;

    /// Hybrid query restricted by the embedded filter.
    async fn query(&self, query: HybridQuery) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Number of points tagged with the given file path.
    async fn count_by_file(&self, file_path: &crate::path::LogicalPath) -> Result<u64, StoreError>;

    /// Fetch a single point's payload by id.
    async fn get_payload(&self, id: Uuid) -> Result<Option<crate::types::PointPayload>, StoreError>;
}
