//! Composition root — builds the one `AppContext` value holding every
//! adapter singleton, applying the first-match-wins selection policy of
//! spec.md §4.5 (ambient addition, SPEC_FULL.md §4.5).
//!
//! Grounded on this codebase's `AppState` pattern (a single cheaply-cloned
//! value carrying every shared service into handlers) and the
//! `OnceCell`-based lazy-singleton idiom `api/handlers/rag.rs` already uses
//! for its embedding/vector-store globals, generalized from static globals
//! into fields owned by one context value built once in `main.rs`.

use std::sync::Arc;

use crate::config::Config;
use crate::embedder::{Embedder, StubEmbedder};
#[cfg(feature = "local-embeddings")]
use crate::embedder::{FastEmbedModelName, FastEmbedder};
use crate::jobqueue::JobQueue;
use crate::llm::{HttpLlmClient, LLMClient, StubLlmClient};
use crate::pipeline::Pipeline;
use crate::rag::RagEngine;
use crate::repository::{Repository, SqlRepository};
use crate::storage::{LocalRawStorage, RawStorage, S3RawStorage};
use crate::types::{AppError, Result};
use crate::vectorstore::{Distance, LocalVectorStore};
#[cfg(feature = "qdrant")]
use crate::vectorstore::QdrantVectorStore;
use crate::vectorstore::VectorStore;
use crate::workspace::WorkspaceManager;

/// Every adapter singleton plus the higher-level services built from
/// them, constructed once at process start and cloned (by `Arc`) into
/// every handler and worker.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub repository: Arc<dyn Repository>,
    pub raw_storage: Arc<dyn RawStorage>,
    pub vector_store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LLMClient>,
    pub pipeline: Arc<Pipeline>,
    pub rag: Arc<RagEngine>,
    pub workspace: Arc<WorkspaceManager>,
    pub job_queue: Arc<JobQueue>,
}

impl AppContext {
    /// Builds the full context from `config`, applying spec.md §4.5's
    /// adapter-selection policy, then eagerly checks the one startup-fatal
    /// invariant the spec calls out: `Embedder.dim() == VectorStore`'s
    /// collection dimension (spec.md §8).
    pub async fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let repository = build_repository(&config).await?;
        let raw_storage = build_raw_storage(&config);
        let vector_store = build_vector_store(&config).await?;
        let embedder = build_embedder(&config)?;
        let llm = build_llm(&config)?;

        vector_store
            .ensure_collection(embedder.dim(), Distance::Cosine)
            .await
            .map_err(|e| {
                AppError::Permanent(format!(
                    "embedder dimension {} is incompatible with the vector store: {e}",
                    embedder.dim()
                ))
            })?;

        let pipeline = Arc::new(Pipeline::new(
            repository.clone(),
            raw_storage.clone(),
            vector_store.clone(),
            embedder.clone(),
            config.chunk_size,
            config.chunk_overlap,
        ));

        let llm_model = config
            .llm
            .as_ref()
            .map(|l| l.model.clone())
            .unwrap_or_else(|| "stub".to_string());
        let rag = Arc::new(RagEngine::new(
            repository.clone(),
            vector_store.clone(),
            embedder.clone(),
            llm.clone(),
            llm_model,
            config.rag_history_n,
        ));

        let workspace = Arc::new(WorkspaceManager::new(
            repository.clone(),
            raw_storage.clone(),
            vector_store.clone(),
        ));

        let job_queue = Arc::new(JobQueue::start(pipeline.clone(), None));

        Ok(Self {
            config,
            repository,
            raw_storage,
            vector_store,
            embedder,
            llm,
            pipeline,
            rag,
            workspace,
            job_queue,
        })
    }
}

async fn build_repository(config: &Config) -> Result<Arc<dyn Repository>> {
    let repo = match &config.database_url {
        Some(url) => SqlRepository::open_remote(url, "").await?,
        None => {
            let path = format!("{}/metadata.db", config.local_storage_root);
            if let Some(parent) = std::path::Path::new(&path).parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::Internal(format!("creating local_storage dir: {e}")))?;
            }
            SqlRepository::open_local(&path).await?
        }
    };
    Ok(Arc::new(repo))
}

fn build_raw_storage(config: &Config) -> Arc<dyn RawStorage> {
    match &config.minio {
        Some(minio) => Arc::new(S3RawStorage::new(minio.clone())),
        None => Arc::new(LocalRawStorage::new(format!(
            "{}/raw",
            config.local_storage_root
        ))),
    }
}

async fn build_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    match &config.qdrant {
        Some(qdrant) => {
            #[cfg(feature = "qdrant")]
            {
                let store = QdrantVectorStore::connect(
                    &qdrant.url,
                    qdrant.api_key.as_deref(),
                    qdrant.collection.clone(),
                )?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "qdrant"))]
            {
                Err(AppError::Permanent(format!(
                    "QDRANT_URL is set to {} but this build was compiled without the `qdrant` feature",
                    qdrant.url
                )))
            }
        }
        None => {
            let path = format!("{}/vectors/vectors.json", config.local_storage_root);
            Ok(Arc::new(LocalVectorStore::new(path)?))
        }
    }
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    #[cfg(feature = "local-embeddings")]
    {
        let model = FastEmbedModelName::parse(&config.embedding_model);
        let embedder = FastEmbedder::new(model, 32)?;
        return Ok(Arc::new(embedder));
    }
    #[cfg(not(feature = "local-embeddings"))]
    {
        tracing::warn!(
            "built without the `local-embeddings` feature; falling back to the deterministic \
             stub embedder regardless of EMBEDDING_MODEL"
        );
        let _ = &config.embedding_model;
        Ok(Arc::new(StubEmbedder::default()))
    }
}

fn build_llm(config: &Config) -> Result<Arc<dyn LLMClient>> {
    match &config.llm {
        Some(llm) => Ok(Arc::new(HttpLlmClient::new(&llm.url, &llm.model)?)),
        None => Ok(Arc::new(StubLlmClient)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only runs without the `local-embeddings` feature: with it enabled,
    // `build_embedder` loads a real ONNX model, which needs a download and
    // has no place in a test that must not touch the network.
    #[cfg(not(feature = "local-embeddings"))]
    #[tokio::test]
    async fn local_defaults_build_a_working_context() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            local_storage_root: dir.path().to_string_lossy().to_string(),
            ..Config::default()
        };
        let ctx = AppContext::build(config).await.unwrap();
        assert_eq!(ctx.vector_store.count().await.unwrap(), 0);
        let workspace = ctx.workspace.create_workspace("acme").await.unwrap();
        assert_eq!(ctx.workspace.list_workspaces().await.unwrap().len(), 1);
        let _ = workspace.id;
    }
}
