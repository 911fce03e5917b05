//! `POST /v1/documents/upload`, `GET /v1/documents`,
//! `GET /v1/documents/{id}/download`, `GET /v1/documents/{id}/status`
//! (spec.md §6).
//!
//! Grounded on this codebase's `api/handlers/rag.rs` `ingest()` handler for
//! the upload-then-enqueue shape, generalized from "chunk inline" to
//! "persist the blob, insert a PENDING document row, enqueue a pipeline
//! job, return 202 immediately" per spec.md §4.2's trigger description.

use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::context::AppContext;
use crate::storage::object_path;
use crate::types::{AppError, DocumentMetaDto, DocumentStatus, Result};

#[derive(Debug, Deserialize)]
pub struct WorkspaceQuery {
    pub workspace_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
}

pub async fn upload(
    State(ctx): State<AppContext>,
    Query(query): Query<WorkspaceQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    // Verify the workspace exists before accepting the upload.
    ctx.repository.get_workspace(query.workspace_id).await?;

    let field = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
        .ok_or_else(|| AppError::Validation("multipart body has no file part".to_string()))?;
    let file_name = field
        .file_name()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unnamed".to_string());
    let bytes = field.bytes().await.map_err(multipart_error)?;

    if bytes.len() > ctx.config.max_upload_bytes {
        return Err(AppError::PayloadTooLarge);
    }

    let (media_type, _extractor) = crate::extract::detect(&bytes)?;

    let document_id = Uuid::new_v4();
    let path = object_path(query.workspace_id, document_id, &file_name);
    ctx.raw_storage.put(&path, bytes.to_vec()).await?;

    let sha256 = hex::encode(Sha256::digest(&bytes));
    let document = match ctx
        .repository
        .create_document(
            query.workspace_id,
            &file_name,
            media_type,
            &sha256,
            &path,
            bytes.len() as i64,
        )
        .await
    {
        Ok(document) => document,
        Err(e) => {
            ctx.raw_storage.delete(&path).await.ok();
            return Err(e);
        }
    };

    ctx.repository
        .update_document_status(document.id, DocumentStatus::Queued, None)
        .await?;

    if ctx.job_queue.submit(document.id).await.is_err() {
        tracing::error!(document_id = %document.id, "failed to enqueue ingestion job");
    }

    Ok((StatusCode::ACCEPTED, Json(UploadResponse { document_id: document.id })))
}

fn multipart_error(e: MultipartError) -> AppError {
    AppError::Validation(format!("invalid multipart body: {e}"))
}

pub async fn list_documents(
    State(ctx): State<AppContext>,
    Query(query): Query<WorkspaceQuery>,
) -> Result<Json<Vec<DocumentMetaDto>>> {
    let documents = ctx
        .repository
        .list_documents_by_workspace(query.workspace_id)
        .await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Serialize)]
pub struct DocumentStatusResponse {
    pub document_status: DocumentStatus,
}

pub async fn status(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentStatusResponse>> {
    let document = ctx.repository.get_document(id).await?;
    Ok(Json(DocumentStatusResponse {
        document_status: document.status,
    }))
}

pub async fn download(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let document = ctx.repository.get_document(id).await?;
    let object = ctx.raw_storage.get(&document.raw_storage_path).await?;

    let body = Body::from_stream(object.stream);
    let response = Response::builder()
        .header(header::CONTENT_LENGTH, object.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", document.document_name),
        )
        .body(body)
        .map_err(|e| AppError::Internal(format!("building download response: {e}")))?;
    Ok(response.into_response())
}
