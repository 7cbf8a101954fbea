//! Embedder pool with bounded concurrency.

use std::sync::Arc;
use tokio::sync::Semaphore;

use lorebase_core::{DenseEmbedding, EmbedError, Embedder, TokenCounter};

/// Shares one embedder across the indexer workers and the search path,
/// capping concurrent inference with a semaphore.
pub struct EmbedderPool {
    embedder: Arc<dyn Embedder>,
    semaphore: Semaphore,
    max_concurrent: usize,
}

impl EmbedderPool {
    pub fn new(embedder: Arc<dyn Embedder>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            embedder,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
        }
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn embedding_version(&self) -> u32 {
        self.embedder.embedding_version()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// The embedder's tokenizer, for the chunker.
    pub fn token_counter(&self) -> &dyn TokenCounter {
        self.embedder.as_ref()
    }

    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<DenseEmbedding>, EmbedError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| EmbedError::Inference(format!("semaphore closed: {e}")))?;
        self.embedder.embed_batch(texts).await
    }

    pub async fn embed_query(&self, query: &str) -> Result<DenseEmbedding, EmbedError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| EmbedError::Inference(format!("semaphore closed: {e}")))?;
        self.embedder.embed_query(query).await
    }
}
