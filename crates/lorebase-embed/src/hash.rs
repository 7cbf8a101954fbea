//! Feature-hashing dense embedder.
//!
//! Model-free embedder that folds token hashes into a fixed-dimension
//! vector and L2-normalizes it. Texts sharing vocabulary land near each
//! other, which is enough signal for the pipeline and its tests to exercise
//! real retrieval. Production deployments swap in a transformer-backed
//! [`Embedder`] behind the same trait; this one is always available.

use async_trait::async_trait;

use lorebase_core::{DenseEmbedding, EmbedError, Embedder, TokenCounter};

/// Deterministic hashed bag-of-tokens embedder.
pub struct HashEmbedder {
    dimension: usize,
    version: u32,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
            version: 1,
        }
    }

    /// Same embedder reporting a different version; used to exercise
    /// lazy re-embedding on version bumps.
    #[must_use]
    pub fn with_version(dimension: usize, version: u32) -> Self {
        Self {
            dimension: dimension.max(8),
            version,
        }
    }

    fn embed_one(&self, text: &str) -> DenseEmbedding {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = tokenize(text);
        for token in &tokens {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let idx = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
                % self.dimension;
            let sign = if bytes[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        DenseEmbedding {
            vector,
            token_count: tokens.len(),
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl TokenCounter for HashEmbedder {
    fn count_tokens(&self, text: &str) -> usize {
        tokenize(text).len()
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "feature-hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embedding_version(&self) -> u32 {
        self.version
    }

    fn max_tokens(&self) -> usize {
        8192
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<DenseEmbedding>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Lower-cased alphanumeric tokens, shared by the dense and sparse paths.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
