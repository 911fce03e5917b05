use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AppError, Result, SearchHit, VectorFilter};

use super::{cosine_similarity, Distance, VectorPoint, VectorStore};

#[derive(Serialize, Deserialize)]
struct StoredPoint {
    id: Uuid,
    vector: Vec<f32>,
    payload: crate::types::VectorPayload,
    /// Monotonic insertion counter, used to break score ties by insertion
    /// order as spec.md §4.1 requires.
    seq: u64,
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    dim: Option<usize>,
    distance: Option<String>,
    next_seq: u64,
    points: Vec<StoredPoint>,
}

struct State {
    dim: Option<usize>,
    distance: Distance,
    next_seq: u64,
    points: HashMap<Uuid, StoredPoint>,
}

/// Brute-force cosine-similarity vector store persisted as a single JSON
/// file. Selected when `QDRANT_URL`/`QDRANT_HOST` is unset (spec.md §4.5).
///
/// Grounded on this codebase's `InMemoryVectorStore` (RwLock + HashMap +
/// `cosine_similarity`) generalized with the JSON `save`/`load` persistence
/// idiom this codebase's search engine already uses for its own indices.
pub struct LocalVectorStore {
    path: PathBuf,
    state: RwLock<State>,
}

impl LocalVectorStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = Self::load_or_default(&path)?;
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    fn load_or_default(path: &Path) -> Result<State> {
        if !path.exists() {
            return Ok(State {
                dim: None,
                distance: Distance::Cosine,
                next_seq: 0,
                points: HashMap::new(),
            });
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Internal(format!("reading vector store file: {e}")))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .map_err(|e| AppError::Internal(format!("parsing vector store file: {e}")))?;
        let points = snapshot
            .points
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        Ok(State {
            dim: snapshot.dim,
            distance: snapshot
                .distance
                .as_deref()
                .map(Distance::parse)
                .unwrap_or(Distance::Cosine),
            next_seq: snapshot.next_seq,
            points,
        })
    }

    fn persist(&self, state: &State) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Internal(format!("creating vector store dir: {e}")))?;
        }
        let snapshot = Snapshot {
            dim: state.dim,
            distance: Some(match state.distance {
                Distance::Cosine => "cosine",
                Distance::Dot => "dot",
                Distance::Euclidean => "euclidean",
            }.to_string()),
            next_seq: state.next_seq,
            points: state
                .points
                .values()
                .map(|p| StoredPoint {
                    id: p.id,
                    vector: p.vector.clone(),
                    payload: p.payload.clone(),
                    seq: p.seq,
                })
                .collect(),
        };
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| AppError::Internal(format!("serializing vector store: {e}")))?;
        std::fs::write(&self.path, json)
            .map_err(|e| AppError::Internal(format!("writing vector store file: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn ensure_collection(&self, dim: usize, distance: Distance) -> Result<()> {
        let mut state = self.state.write();
        match state.dim {
            Some(existing) if existing != dim => {
                return Err(AppError::Permanent(format!(
                    "vector store dimension mismatch: collection is {existing}, requested {dim}"
                )));
            }
            _ => {
                state.dim = Some(dim);
                state.distance = distance;
            }
        }
        self.persist(&state)
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        let mut state = self.state.write();
        for point in points {
            if let Some(dim) = state.dim {
                if point.vector.len() != dim {
                    return Err(AppError::Permanent(format!(
                        "embedding dimension mismatch: expected {dim}, got {}",
                        point.vector.len()
                    )));
                }
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.points.insert(
                point.id,
                StoredPoint {
                    id: point.id,
                    vector: point.vector,
                    payload: point.payload,
                    seq,
                },
            );
        }
        self.persist(&state)
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: VectorFilter,
    ) -> Result<Vec<SearchHit>> {
        let state = self.state.read();
        let mut scored: Vec<(f32, &StoredPoint)> = state
            .points
            .values()
            .filter(|p| filter.matches(&p.payload))
            .map(|p| (cosine_similarity(vector, &p.vector), p))
            .collect();

        scored.sort_by(|a, b| match b.0.partial_cmp(&a.0) {
            Some(std::cmp::Ordering::Equal) | None => a.1.seq.cmp(&b.1.seq),
            Some(ord) => ord,
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, p)| SearchHit {
                score,
                payload: p.payload.clone(),
            })
            .collect())
    }

    async fn delete_by_filter(&self, filter: VectorFilter) -> Result<()> {
        let mut state = self.state.write();
        state.points.retain(|_, p| !filter.matches(&p.payload));
        self.persist(&state)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().points.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VectorPayload;

    fn payload(workspace_id: Uuid, document_id: Uuid) -> VectorPayload {
        VectorPayload {
            workspace_id,
            document_id,
            document_name: "doc.pdf".to_string(),
            page_start: 1,
            page_end: 1,
            snippet: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_and_search_filters_by_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::new(dir.path().join("vectors.json")).unwrap();
        store.ensure_collection(3, Distance::Cosine).await.unwrap();

        let ws1 = Uuid::new_v4();
        let ws2 = Uuid::new_v4();
        let doc1 = Uuid::new_v4();

        store
            .upsert(vec![VectorPoint {
                id: Uuid::new_v4(),
                vector: vec![1.0, 0.0, 0.0],
                payload: payload(ws1, doc1),
            }])
            .await
            .unwrap();
        store
            .upsert(vec![VectorPoint {
                id: Uuid::new_v4(),
                vector: vec![0.0, 1.0, 0.0],
                payload: payload(ws2, Uuid::new_v4()),
            }])
            .await
            .unwrap();

        let hits = store
            .search(&[1.0, 0.0, 0.0], 10, VectorFilter::workspace(ws1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.workspace_id, ws1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_permanent_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::new(dir.path().join("vectors.json")).unwrap();
        store.ensure_collection(3, Distance::Cosine).await.unwrap();
        let err = store.ensure_collection(4, Distance::Cosine).await;
        assert!(matches!(err, Err(AppError::Permanent(_))));
    }

    #[tokio::test]
    async fn delete_by_filter_removes_workspace_points() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::new(dir.path().join("vectors.json")).unwrap();
        store.ensure_collection(3, Distance::Cosine).await.unwrap();
        let ws = Uuid::new_v4();
        let doc = Uuid::new_v4();
        store
            .upsert(vec![VectorPoint {
                id: Uuid::new_v4(),
                vector: vec![1.0, 0.0, 0.0],
                payload: payload(ws, doc),
            }])
            .await
            .unwrap();
        store.delete_by_filter(VectorFilter::workspace(ws)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");
        let ws = Uuid::new_v4();
        {
            let store = LocalVectorStore::new(&path).unwrap();
            store.ensure_collection(3, Distance::Cosine).await.unwrap();
            store
                .upsert(vec![VectorPoint {
                    id: Uuid::new_v4(),
                    vector: vec![1.0, 0.0, 0.0],
                    payload: payload(ws, Uuid::new_v4()),
                }])
                .await
                .unwrap();
        }
        let reopened = LocalVectorStore::new(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
