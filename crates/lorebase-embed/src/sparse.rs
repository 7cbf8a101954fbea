//! BM25-style sparse embedding.
//!
//! Produces bag-of-tokens weight vectors: each distinct token maps to a
//! stable hashed index, weighted by saturated term frequency. The vector
//! store scores these against query vectors for the keyword half of hybrid
//! search.

use std::collections::BTreeMap;

use lorebase_core::{SparseEmbedder, SparseVector};

/// Term-frequency saturation constant (BM25 `k1`).
const K1: f32 = 1.2;

/// Sparse token-weight embedder.
#[derive(Debug, Default, Clone)]
pub struct Bm25SparseEmbedder;

impl Bm25SparseEmbedder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn embed_one(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
        for token in crate::hash::tokenize(text) {
            *counts.entry(token_index(&token)).or_insert(0.0) += 1.0;
        }
        let mut indices = Vec::with_capacity(counts.len());
        let mut weights = Vec::with_capacity(counts.len());
        for (idx, tf) in counts {
            indices.push(idx);
            weights.push(tf * (K1 + 1.0) / (tf + K1));
        }
        SparseVector { indices, weights }
    }
}

/// Stable 31-bit index for a token.
fn token_index(token: &str) -> u32 {
    let digest = blake3::hash(token.as_bytes());
    let bytes = digest.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & 0x7FFF_FFFF
}

impl SparseEmbedder for Bm25SparseEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Vec<SparseVector> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }
}
