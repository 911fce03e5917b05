use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::task::spawn_blocking;

use crate::types::{AppError, Result};

use super::Embedder;

/// The small subset of fastembed models this service recognizes via
/// `EMBEDDING_MODEL`, generalized from this codebase's much larger
/// `EmbeddingModelType` catalog down to the 384/768-dim English models
/// relevant to a single-workspace RAG service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastEmbedModelName {
    BgeSmallEnV15,
    AllMiniLmL6V2,
    BgeBaseEnV15,
}

impl FastEmbedModelName {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "all-minilm-l6-v2" | "minilm-l6" => Self::AllMiniLmL6V2,
            "bge-base-en-v1.5" | "bge-base-en" | "bge-base" => Self::BgeBaseEnV15,
            _ => Self::BgeSmallEnV15,
        }
    }

    fn to_fastembed(self) -> EmbeddingModel {
        match self {
            Self::BgeSmallEnV15 => EmbeddingModel::BGESmallENV15,
            Self::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
            Self::BgeBaseEnV15 => EmbeddingModel::BGEBaseENV15,
        }
    }

    fn dim(self) -> usize {
        match self {
            Self::BgeSmallEnV15 | Self::AllMiniLmL6V2 => 384,
            Self::BgeBaseEnV15 => 768,
        }
    }
}

/// Local CPU embedding model via `fastembed`, selected by default
/// (spec.md §4.1: "a reference implementation uses a 384-dim MiniLM-class
/// model"). Built once in `new` and held behind a `Mutex` so every `encode`
/// call reuses the same loaded model instead of reloading the ONNX graph
/// per call; each call still runs on the blocking thread pool via
/// `spawn_blocking`, the same idiom this codebase's `EmbeddingService`
/// already uses for blocking inference work.
pub struct FastEmbedder {
    model: FastEmbedModelName,
    batch_size: usize,
    embedding: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedder {
    pub fn new(model: FastEmbedModelName, batch_size: usize) -> Result<Self> {
        let embedding = TextEmbedding::try_new(
            InitOptions::new(model.to_fastembed()).with_show_download_progress(false),
        )
        .map_err(|e| AppError::Internal(format!("loading embedding model: {e}")))?;
        Ok(Self {
            model,
            batch_size,
            embedding: Arc::new(Mutex::new(embedding)),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let batch_size = self.batch_size;
        let embedding = self.embedding.clone();
        spawn_blocking(move || {
            let mut embedding = embedding
                .lock()
                .map_err(|_| AppError::Internal("embedding model mutex poisoned".to_string()))?;
            let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
            embedding
                .embed(refs, Some(batch_size))
                .map_err(|e| AppError::Transient(format!("embedding failed: {e}")))
        })
        .await
        .map_err(|e| AppError::Internal(format!("embedding task panicked: {e}")))?
    }

    fn dim(&self) -> usize {
        self.model.dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_model_names() {
        assert_eq!(FastEmbedModelName::parse("bge-small-en-v1.5").dim(), 384);
        assert_eq!(FastEmbedModelName::parse("bge-base-en-v1.5").dim(), 768);
        assert_eq!(FastEmbedModelName::parse("unknown"), FastEmbedModelName::BgeSmallEnV15);
    }
}
