//! `GET /v1/ops/status` (SPEC_FULL.md §4.6): reports each adapter's
//! reachability by invoking its lightweight health probe.
//!
//! Grounded on this codebase's `LLMClient::health_check` idiom, generalized
//! to the other three adapters, each of which already has a cheap read-only
//! operation that doubles as a probe (`count`, `list_workspaces`, `exists`).

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::context::AppContext;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub repository: bool,
    pub raw_storage: bool,
    pub vector_store: bool,
    pub llm: bool,
}

pub async fn status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    let repository = ctx.repository.list_workspaces().await.is_ok();
    let raw_storage = ctx.raw_storage.exists("__ops_status_probe__").await.is_ok();
    let vector_store = ctx.vector_store.count().await.is_ok();
    let llm = ctx.llm.health_check().await;

    Json(StatusResponse {
        repository,
        raw_storage,
        vector_store,
        llm,
    })
}
