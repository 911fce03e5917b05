use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance as QdrantDistance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use uuid::Uuid;

use crate::types::{AppError, Result, SearchHit, VectorFilter, VectorPayload};

use super::{Distance, VectorPoint, VectorStore};

/// Real networked Qdrant adapter, selected when `QDRANT_URL` (or
/// `QDRANT_HOST`+`QDRANT_PORT`) is set (spec.md §4.5). This codebase's own
/// `db/qdrant.rs` is a same-named but purely local in-memory stub; it
/// grounds only the method shape (ensure_collection/upsert/search/delete)
/// and error-wrapping convention, not its body — the real client is built
/// directly against the `qdrant-client` crate's API.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorStore {
    pub fn connect(url: &str, api_key: Option<&str>, collection: String) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder
            .build()
            .map_err(|e| AppError::Permanent(format!("connecting to Qdrant: {e}")))?;
        Ok(Self { client, collection })
    }

    fn to_payload(payload: &VectorPayload) -> Payload {
        serde_json::json!({
            "workspace_id": payload.workspace_id.to_string(),
            "document_id": payload.document_id.to_string(),
            "document_name": payload.document_name,
            "page_start": payload.page_start,
            "page_end": payload.page_end,
            "snippet": payload.snippet,
        })
        .try_into()
        .expect("payload is always a JSON object")
    }

    fn from_payload(id: Uuid, payload: &std::collections::HashMap<String, qdrant_client::qdrant::Value>) -> Option<VectorPayload> {
        let get_str = |key: &str| payload.get(key).and_then(|v| v.as_str()).map(|s| s.to_string());
        let get_int = |key: &str| payload.get(key).and_then(|v| v.as_integer());
        Some(VectorPayload {
            workspace_id: get_str("workspace_id")?.parse().ok()?,
            document_id: get_str("document_id")?.parse().ok().unwrap_or(id),
            document_name: get_str("document_name")?,
            page_start: get_int("page_start")?,
            page_end: get_int("page_end")?,
            snippet: get_str("snippet")?,
        })
    }

    fn build_filter(filter: &VectorFilter) -> Filter {
        let mut must = Vec::new();
        if let Some(ws) = filter.workspace_id {
            must.push(Condition::matches("workspace_id", ws.to_string()));
        }
        if let Some(doc) = filter.document_id {
            must.push(Condition::matches("document_id", doc.to_string()));
        }
        Filter::must(must)
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, dim: usize, distance: Distance) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| AppError::Transient(format!("Qdrant collection_exists: {e}")))?;

        if exists {
            let info = self
                .client
                .collection_info(&self.collection)
                .await
                .map_err(|e| AppError::Transient(format!("Qdrant collection_info: {e}")))?;
            if let Some(params) = info
                .result
                .and_then(|r| r.config)
                .and_then(|c| c.params)
                .and_then(|p| p.vectors_config)
                .and_then(|v| v.config)
            {
                use qdrant_client::qdrant::vectors_config::Config;
                if let Config::Params(vp) = params {
                    if vp.size as usize != dim {
                        return Err(AppError::Permanent(format!(
                            "Qdrant collection dimension mismatch: collection is {}, requested {dim}",
                            vp.size
                        )));
                    }
                }
            }
            return Ok(());
        }

        let qdrant_distance = match distance {
            Distance::Cosine => QdrantDistance::Cosine,
            Distance::Dot => QdrantDistance::Dot,
            Distance::Euclidean => QdrantDistance::Euclid,
        };

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, qdrant_distance)),
            )
            .await
            .map_err(|e| AppError::Permanent(format!("creating Qdrant collection: {e}")))?;
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                PointStruct::new(
                    p.id.to_string(),
                    p.vector,
                    Self::to_payload(&p.payload),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, qdrant_points))
            .await
            .map_err(|e| AppError::Transient(format!("Qdrant upsert: {e}")))?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: VectorFilter,
    ) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
                    .filter(Self::build_filter(&filter))
                    .with_payload(true),
            )
            .await
            .map_err(|e| AppError::Transient(format!("Qdrant search: {e}")))?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = point
                    .id
                    .as_ref()
                    .and_then(|id| match &id.point_id_options {
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s)) => {
                            s.parse().ok()
                        }
                        _ => None,
                    })
                    .unwrap_or_else(Uuid::new_v4);
                let payload = Self::from_payload(id, &point.payload)?;
                Some(SearchHit {
                    score: point.score,
                    payload,
                })
            })
            .collect();
        Ok(hits)
    }

    async fn delete_by_filter(&self, filter: VectorFilter) -> Result<()> {
        self.client
            .delete_points(
                qdrant_client::qdrant::DeletePointsBuilder::new(&self.collection)
                    .points(qdrant_client::qdrant::PointsSelector::from(
                        Self::build_filter(&filter),
                    )),
            )
            .await
            .map_err(|e| AppError::Transient(format!("Qdrant delete: {e}")))?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .client
            .count(qdrant_client::qdrant::CountPointsBuilder::new(&self.collection))
            .await
            .map_err(|e| AppError::Transient(format!("Qdrant count: {e}")))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}
