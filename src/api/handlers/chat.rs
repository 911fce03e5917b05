//! `POST /v1/chat/ask`, `GET /v1/chat`, `GET /v1/chat/{session_id}/messages`
//! (spec.md §6), delegating to the `RagEngine`/`Repository`.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::context::AppContext;
use crate::rag::AskInput;
use crate::types::{AskRequest, AskResponse, ChatMessageDto, ChatSessionDto, Result, SourceDto};

pub async fn ask(
    State(ctx): State<AppContext>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    let top_k = payload.top_k.unwrap_or(ctx.config.rag_top_k_default);
    let output = ctx
        .rag
        .ask(AskInput {
            workspace_id: payload.workspace_id,
            question: payload.question,
            top_k,
            session_id: payload.session_id,
        })
        .await?;

    let sources = output
        .sources
        .into_iter()
        .map(|s| SourceDto {
            source_id: s.source_id,
            document_name: s.document_name,
            page_start: s.page_start,
            page_end: s.page_end,
            snippet: s.snippet,
        })
        .collect();

    Ok(Json(AskResponse {
        answer: output.answer,
        sources,
        session_id: output.session_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceQuery {
    pub workspace_id: Uuid,
}

pub async fn list_sessions(
    State(ctx): State<AppContext>,
    Query(query): Query<WorkspaceQuery>,
) -> Result<Json<Vec<ChatSessionDto>>> {
    let sessions = ctx
        .repository
        .list_sessions_by_workspace(query.workspace_id)
        .await?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

pub async fn list_messages(
    State(ctx): State<AppContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessageDto>>> {
    // Confirms the session exists before listing (unknown session ids are
    // a 404, not an empty list).
    ctx.repository.get_session(session_id).await?;
    let messages = ctx.repository.list_messages_by_session(session_id).await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}
