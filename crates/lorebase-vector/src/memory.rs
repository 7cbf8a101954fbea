//! In-memory hybrid vector store.
//!
//! Brute-force scoring over a `HashMap` of points: dense cosine similarity
//! plus a cosine-normalized dot product over sparse token weights, fused as
//! `alpha * dense + (1 - alpha) * sparse`. Not built for large corpora —
//! it is the always-available backend for tests, development, and small
//! deployments, behind the same [`VectorStore`] trait a remote backend
//! implements.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use lorebase_core::{
    HybridQuery, LogicalPath, PointPayload, ScoredPoint, SparseVector, StoreError, VectorFilter,
    VectorPoint, VectorStore,
};

/// Brute-force in-memory backend.
pub struct MemoryVectorStore {
    dimension: usize,
    points: Arc<RwLock<HashMap<Uuid, VectorPoint>>>,
}

impl MemoryVectorStore {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            points: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Total number of stored points.
    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            dot / (na * nb)
        }
    }

    /// Cosine-normalized overlap of two sparse token-weight vectors.
    fn sparse_score(query: &SparseVector, point: &SparseVector) -> f32 {
        if query.is_empty() || point.is_empty() {
            return 0.0;
        }
        let point_map: HashMap<u32, f32> = point
            .indices
            .iter()
            .copied()
            .zip(point.weights.iter().copied())
            .collect();
        let dot: f32 = query
            .indices
            .iter()
            .zip(query.weights.iter())
            .filter_map(|(idx, w)| point_map.get(idx).map(|pw| w * pw))
            .sum();
        if dot == 0.0 {
            return 0.0;
        }
        let nq: f32 = query.weights.iter().map(|w| w * w).sum::<f32>().sqrt();
        let np: f32 = point.weights.iter().map(|w| w * w).sum::<f32>().sqrt();
        dot / (nq * np)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn init(&self) -> Result<(), StoreError> {
        debug!("memory vector store ready (dimension {})", self.dimension);
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), StoreError> {
        let mut store = self.points.write().await;
        for point in points {
            if point.dense.len() != self.dimension {
                return Err(StoreError::Write(format!(
                    "dimension mismatch: got {}, expected {}",
                    point.dense.len(),
                    self.dimension
                )));
            }
            store.insert(point.id, point);
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &VectorFilter) -> Result<u64, StoreError> {
        let mut store = self.points.write().await;
        let before = store.len();
        store.retain(|_, p| !filter.matches(&p.payload));
        let deleted = (before - store.len()) as u64;
        if deleted > 0 {
            debug!("deleted {deleted} points");
        }
        Ok(deleted)
    }

    async fn query(&self, query: HybridQuery) -> Result<Vec<ScoredPoint>, StoreError> {
        let alpha = query.alpha.clamp(0.0, 1.0);
        let store = self.points.read().await;

        let mut scored: Vec<ScoredPoint> = store
            .values()
            .filter(|p| query.filter.matches(&p.payload))
            .map(|p| {
                let dense = Self::cosine(&query.dense, &p.dense);
                let sparse = match (&query.sparse, &p.sparse) {
                    (Some(q), Some(pt)) => Self::sparse_score(q, pt),
                    _ => 0.0,
                };
                ScoredPoint {
                    id: p.id,
                    score: alpha * dense + (1.0 - alpha) * sparse,
                    payload: p.payload.clone(),
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(query.limit);
        Ok(scored)
    }

    async fn count_by_file(&self, file_path: &LogicalPath) -> Result<u64, StoreError> {
        let store = self.points.read().await;
        Ok(store
            .values()
            .filter(|p| &p.payload.file_path == file_path)
            .count() as u64)
    }

    async fn get_payload(&self, id: Uuid) -> Result<Option<PointPayload>, StoreError> {
        let store = self.points.read().await;
        Ok(store.get(&id).map(|p| p.payload.clone()))
    }
}
