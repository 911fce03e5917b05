//! Workspace/Session Manager — workspace lifecycle and cascading delete
//! (spec.md §4.4).
//!
//! Grounded on this codebase's `db/traits.rs` CRUD shape for the plain
//! CRUD methods, and on `jobqueue.rs`'s bounded-channel-plus-worker-pool
//! shape for `delete_workspace`: spec.md §4.4 requires the call to return
//! immediately and run the cascade (vectors, then blobs, then the
//! repository row) in the background, retrying each step on a transient
//! adapter error, so the repository row is deleted last and only once the
//! other two steps have actually succeeded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::repository::Repository;
use crate::storage::RawStorage;
use crate::types::{AppError, Result, VectorFilter, Workspace};
use crate::vectorstore::VectorStore;

/// Bounds the number of workspace deletes in flight at once.
const DELETE_QUEUE_CAPACITY: usize = 64;

/// Bounded attempts per cascade step before giving up and logging.
const DELETE_MAX_ATTEMPTS: u32 = 4;
const DELETE_BASE_BACKOFF: Duration = Duration::from_millis(200);

pub struct WorkspaceManager {
    repository: Arc<dyn Repository>,
    delete_sender: mpsc::Sender<Uuid>,
}

impl WorkspaceManager {
    pub fn new(
        repository: Arc<dyn Repository>,
        raw_storage: Arc<dyn RawStorage>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Self {
        let (delete_sender, delete_receiver) = mpsc::channel(DELETE_QUEUE_CAPACITY);
        let receiver = Arc::new(tokio::sync::Mutex::new(delete_receiver));

        let worker_repository = repository.clone();
        let worker_raw_storage = raw_storage.clone();
        let worker_vector_store = vector_store.clone();
        tokio::spawn(async move {
            loop {
                let id = {
                    let mut receiver = receiver.lock().await;
                    receiver.recv().await
                };
                let Some(id) = id else { break };
                tracing::info!(workspace_id = %id, "running workspace delete cascade");
                if let Err(e) = run_delete_cascade(
                    &worker_repository,
                    &worker_raw_storage,
                    &worker_vector_store,
                    id,
                )
                .await
                {
                    tracing::error!(workspace_id = %id, error = %e, "workspace delete cascade failed");
                }
            }
        });

        Self {
            repository,
            delete_sender,
        }
    }

    /// Unique constraint violation surfaces as `Conflict` (the repository
    /// adapter is responsible for that mapping).
    pub async fn create_workspace(&self, name: &str) -> Result<Workspace> {
        self.repository.create_workspace(name).await
    }

    pub async fn get_workspace(&self, id: Uuid) -> Result<Workspace> {
        self.repository.get_workspace(id).await
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        self.repository.list_workspaces().await
    }

    /// Confirms `id` exists, then enqueues the cascade and returns
    /// immediately — the vector/blob/repository cleanup runs on a
    /// background worker (spec.md §4.4).
    pub async fn delete_workspace(&self, id: Uuid) -> Result<()> {
        self.repository.get_workspace(id).await?;
        self.delete_sender.send(id).await.map_err(|_| {
            AppError::Internal("workspace delete queue workers are no longer running".to_string())
        })
    }
}

/// Runs the three cascade steps in order, retrying each on
/// `AppError::Transient` before moving to the next. The repository row is
/// deleted last so a crash mid-cascade leaves the workspace row as the
/// resumable anchor for the next `delete_workspace` call.
async fn run_delete_cascade(
    repository: &Arc<dyn Repository>,
    raw_storage: &Arc<dyn RawStorage>,
    vector_store: &Arc<dyn VectorStore>,
    id: Uuid,
) -> Result<()> {
    retry_step(&format!("vector delete for workspace {id}"), || {
        vector_store.delete_by_filter(VectorFilter::workspace(id))
    })
    .await?;
    retry_step(&format!("blob delete for workspace {id}"), || {
        raw_storage.delete_prefix(&format!("{id}/"))
    })
    .await?;
    retry_step(&format!("repository delete for workspace {id}"), || {
        repository.delete_workspace(id)
    })
    .await
}

/// Retries `step` up to `DELETE_MAX_ATTEMPTS` times with capped
/// exponential backoff whenever it fails with `AppError::Transient`; any
/// other error (or exhausting the attempt budget) is returned as-is.
async fn retry_step<F, Fut>(description: &str, mut step: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match step().await {
            Ok(()) => return Ok(()),
            Err(AppError::Transient(msg)) if attempt < DELETE_MAX_ATTEMPTS => {
                let backoff = DELETE_BASE_BACKOFF * 2u32.pow(attempt - 1);
                tracing::warn!(
                    description,
                    attempt,
                    error = %msg,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient failure in workspace delete cascade, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqlRepository;
    use crate::storage::LocalRawStorage;
    use crate::types::{AppError, VectorPayload};
    use crate::vectorstore::{Distance, LocalVectorStore, VectorPoint};

    #[tokio::test]
    async fn delete_workspace_cascades_blobs_and_vectors() {
        let repo = Arc::new(SqlRepository::open_local(":memory:").await.unwrap());
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalRawStorage::new(dir.path()));
        let vector_dir = tempfile::tempdir().unwrap();
        let vector_store = Arc::new(LocalVectorStore::new(vector_dir.path().join("v.json")).unwrap());

        let manager = WorkspaceManager::new(
            repo.clone() as Arc<dyn Repository>,
            storage.clone() as Arc<dyn RawStorage>,
            vector_store.clone() as Arc<dyn VectorStore>,
        );

        let workspace = manager.create_workspace("acme").await.unwrap();
        let path = crate::storage::object_path(workspace.id, Uuid::new_v4(), "doc.pdf");
        storage.put(&path, b"hello".to_vec()).await.unwrap();

        vector_store.ensure_collection(3, Distance::Cosine).await.unwrap();
        vector_store
            .upsert(vec![VectorPoint {
                id: Uuid::new_v4(),
                vector: vec![1.0, 0.0, 0.0],
                payload: VectorPayload {
                    workspace_id: workspace.id,
                    document_id: Uuid::new_v4(),
                    document_name: "doc.pdf".to_string(),
                    page_start: 1,
                    page_end: 1,
                    snippet: "hello".to_string(),
                },
            }])
            .await
            .unwrap();

        manager.delete_workspace(workspace.id).await.unwrap();

        // The cascade runs on a background task; poll for it to land
        // rather than assuming it has already run by the time `await`
        // above returns (spec.md §4.4: "returns immediately").
        let mut deleted = false;
        for _ in 0..50 {
            if matches!(
                repo.get_workspace(workspace.id).await,
                Err(AppError::NotFound(_))
            ) {
                deleted = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(deleted, "workspace delete cascade did not complete in time");

        assert!(!storage.exists(&path).await.unwrap());
        assert_eq!(vector_store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_workspace_rejects_unknown_id() {
        let repo = Arc::new(SqlRepository::open_local(":memory:").await.unwrap());
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalRawStorage::new(dir.path()));
        let vector_dir = tempfile::tempdir().unwrap();
        let vector_store = Arc::new(LocalVectorStore::new(vector_dir.path().join("v.json")).unwrap());

        let manager = WorkspaceManager::new(
            repo.clone() as Arc<dyn Repository>,
            storage as Arc<dyn RawStorage>,
            vector_store as Arc<dyn VectorStore>,
        );

        let err = manager.delete_workspace(Uuid::new_v4()).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }
}
