//! `VectorStore` — the ANN-index adapter contract (spec.md §4.1).
//!
//! Vector dimension is fixed at collection creation and must equal the
//! `Embedder`'s output dimension; a mismatch is a startup-fatal error
//! (enforced by the composition root, see `context.rs`).

mod local;
#[cfg(feature = "qdrant")]
mod qdrant;

pub use local::LocalVectorStore;
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::{Result, SearchHit, VectorFilter, VectorPayload};

/// One point to be upserted: an id, its embedding, and its payload.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection if it does not already exist. Calling this
    /// with a `dim` that disagrees with a previously created collection is
    /// a `Permanent` error (dimension mismatch).
    async fn ensure_collection(&self, dim: usize, distance: Distance) -> Result<()>;

    /// Inserts or replaces each point by id.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// Returns up to `top_k` points matching `filter`, ordered by
    /// decreasing similarity; ties are broken by insertion order.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: VectorFilter,
    ) -> Result<Vec<SearchHit>>;

    /// Removes every point matching `filter`.
    async fn delete_by_filter(&self, filter: VectorFilter) -> Result<()>;

    /// Number of points currently stored (any workspace/document).
    async fn count(&self) -> Result<usize>;
}

/// Distance metric used by a collection. Default is cosine (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Cosine,
    Dot,
    Euclidean,
}

impl Distance {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "dot" => Distance::Dot,
            "euclidean" | "l2" => Distance::Euclidean,
            _ => Distance::Cosine,
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identity_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }
}
