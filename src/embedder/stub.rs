use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::types::Result;

use super::Embedder;

/// Deterministic, model-free embedder used by pipeline/RAG-engine tests
/// that must not depend on a downloaded model (spec.md §4.9: hand-written
/// fake adapters for tests that must not touch a live backend).
///
/// Each text is hashed with SHA-256 and the digest bytes are expanded into
/// a unit vector of `dim` floats; identical input always produces the
/// identical output, satisfying the "deterministic for a fixed model"
/// requirement without downloading anything.
pub struct StubEmbedder {
    dim: usize,
}

impl StubEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for StubEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_to_vector(t, self.dim)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

fn hash_to_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(dim);
    let mut counter: u32 = 0;
    while out.len() < dim {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for chunk in digest.chunks(4) {
            if out.len() >= dim {
                break;
            }
            let mut buf = [0u8; 4];
            buf[..chunk.len()].copy_from_slice(chunk);
            let v = u32::from_le_bytes(buf) as f32 / u32::MAX as f32;
            out.push(v);
        }
        counter += 1;
    }

    let norm = out.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut out {
            *v /= norm;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_yields_same_vector() {
        let embedder = StubEmbedder::new(16);
        let a = embedder.encode(vec!["hello".to_string()]).await.unwrap();
        let b = embedder.encode(vec!["hello".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_yields_different_vector() {
        let embedder = StubEmbedder::new(16);
        let a = embedder.encode(vec!["hello".to_string()]).await.unwrap();
        let b = embedder.encode(vec!["goodbye".to_string()]).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn respects_configured_dimension() {
        let embedder = StubEmbedder::new(8);
        let v = embedder.encode(vec!["x".to_string()]).await.unwrap();
        assert_eq!(v[0].len(), 8);
        assert_eq!(embedder.dim(), 8);
    }
}
