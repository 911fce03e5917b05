//! `Embedder` — text-to-vector adapter contract (spec.md §4.1).

#[cfg(feature = "local-embeddings")]
mod fastembed_adapter;
mod stub;

#[cfg(feature = "local-embeddings")]
pub use fastembed_adapter::{FastEmbedModelName, FastEmbedder};
pub use stub::StubEmbedder;

use async_trait::async_trait;

use crate::types::Result;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Batched, deterministic for a fixed model (spec.md §4.1).
    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Output vector dimension. Must equal the active `VectorStore`
    /// collection's dimension; checked once at startup (see `context.rs`).
    fn dim(&self) -> usize;
}
