//! `POST /v1/workspaces`, `GET /v1/workspaces`, `DELETE /v1/workspaces/{id}`
//! (spec.md §6), delegating directly to the `WorkspaceManager`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::context::AppContext;
use crate::types::{Result, WorkspaceDto};

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
}

pub async fn create_workspace(
    State(ctx): State<AppContext>,
    Json(payload): Json<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<WorkspaceDto>)> {
    let workspace = ctx.workspace.create_workspace(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(workspace.into())))
}

pub async fn list_workspaces(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<WorkspaceDto>>> {
    let workspaces = ctx.workspace.list_workspaces().await?;
    Ok(Json(workspaces.into_iter().map(Into::into).collect()))
}

pub async fn delete_workspace(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    ctx.workspace.delete_workspace(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
