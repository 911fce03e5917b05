use crate::api::handlers::{chat, documents, ops, workspaces};
use crate::context::AppContext;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

pub fn create_router(ctx: AppContext) -> Router {
    let max_upload_bytes = ctx.config.max_upload_bytes;

    Router::new()
        .route("/v1/workspaces", post(workspaces::create_workspace))
        .route("/v1/workspaces", get(workspaces::list_workspaces))
        .route("/v1/workspaces/{id}", delete(workspaces::delete_workspace))
        .route(
            "/v1/documents/upload",
            post(documents::upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/v1/documents", get(documents::list_documents))
        .route("/v1/documents/{id}/status", get(documents::status))
        .route("/v1/documents/{id}/download", get(documents::download))
        .route("/v1/chat/ask", post(chat::ask))
        .route("/v1/chat", get(chat::list_sessions))
        .route("/v1/chat/{session_id}/messages", get(chat::list_messages))
        .route("/v1/ops/status", get(ops::status))
        .with_state(ctx)
}
