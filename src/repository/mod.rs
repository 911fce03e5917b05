//! `Repository` — transactional metadata access over the entities of
//! spec.md §3 (spec.md §4.1).
//!
//! `DATABASE_URL` set selects the remote libsql/Turso-backed adapter;
//! unset selects the same adapter pointed at a local embedded database
//! file under `./local_storage/` (spec.md §4.5) — libsql natively supports
//! both modes through one client, mirroring this codebase's own
//! `TursoClient`, which already differentiates local vs. remote by URL
//! rather than by adapter type.

mod sql;

pub use sql::SqlRepository;

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::{
    ChatMessage, ChatMessageSource, ChatSession, Document, DocumentEvent, DocumentStatus,
    MessageRole, PipelineStage, Result, StageStatus, Workspace,
};

/// Fields accepted when recording a completed ingestion (spec.md §4.2 step 7).
#[derive(Debug, Clone, Default)]
pub struct DocumentCommit {
    pub detected_language: Option<String>,
    pub page_count: Option<i64>,
    pub author: Option<String>,
    pub creation_date: Option<String>,
}

#[async_trait]
pub trait Repository: Send + Sync {
    // ---- Workspace ----
    async fn create_workspace(&self, name: &str) -> Result<Workspace>;
    async fn get_workspace(&self, id: Uuid) -> Result<Workspace>;
    async fn list_workspaces(&self) -> Result<Vec<Workspace>>;
    /// Cascading delete: removes the workspace and every dependent row
    /// (documents, events, sessions, messages, sources). Does not touch
    /// the raw-storage blobs or vector index — callers orchestrate those
    /// separately (see `workspace.rs`).
    async fn delete_workspace(&self, id: Uuid) -> Result<()>;

    // ---- Document ----
    #[allow(clippy::too_many_arguments)]
    async fn create_document(
        &self,
        workspace_id: Uuid,
        document_name: &str,
        media_type: &str,
        sha256: &str,
        raw_storage_path: &str,
        size_bytes: i64,
    ) -> Result<Document>;
    async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<()>;
    async fn commit_document(&self, id: Uuid, commit: DocumentCommit) -> Result<()>;
    async fn get_document(&self, id: Uuid) -> Result<Document>;
    async fn list_documents_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Document>>;
    async fn delete_document(&self, id: Uuid) -> Result<()>;

    // ---- DocumentEvent ----
    /// Inserts or updates the single event row for `(document_id, stage)`.
    async fn upsert_stage_event(
        &self,
        document_id: Uuid,
        stage: PipelineStage,
        status: StageStatus,
        duration_ms: Option<i64>,
    ) -> Result<()>;
    async fn list_events_by_document(&self, document_id: Uuid) -> Result<Vec<DocumentEvent>>;

    // ---- ChatSession ----
    async fn create_session(&self, workspace_id: Uuid) -> Result<ChatSession>;
    async fn get_session(&self, id: Uuid) -> Result<ChatSession>;
    async fn list_sessions_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<ChatSession>>;
    async fn delete_session(&self, id: Uuid) -> Result<()>;

    // ---- ChatMessage / ChatMessageSource ----
    async fn create_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage>;
    async fn list_messages_by_session(&self, session_id: Uuid) -> Result<Vec<ChatMessage>>;
    async fn recent_messages(&self, session_id: Uuid, n: usize) -> Result<Vec<ChatMessage>>;
    async fn bulk_create_sources(&self, sources: Vec<NewSource>) -> Result<()>;

    /// Records one completed `/ask` turn — the user message, the assistant
    /// message, and the assistant message's sources — as a single unit of
    /// work (spec.md §4.3 step 8). Returns the two inserted messages.
    async fn record_turn(
        &self,
        session_id: Uuid,
        question: &str,
        answer: &str,
        sources: Vec<NewSourceRef>,
    ) -> Result<(ChatMessage, ChatMessage)>;
}

/// A source row to attach to an already-inserted message.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub message_id: Uuid,
    pub source_id: Uuid,
    pub document_name: String,
    pub page_start: i64,
    pub page_end: i64,
    pub snippet: String,
}

/// A source reference without a message id yet, used inside `record_turn`
/// before the assistant message id is known.
#[derive(Debug, Clone)]
pub struct NewSourceRef {
    pub source_id: Uuid,
    pub document_name: String,
    pub page_start: i64,
    pub page_end: i64,
    pub snippet: String,
}

impl From<&ChatMessageSource> for NewSourceRef {
    fn from(s: &ChatMessageSource) -> Self {
        Self {
            source_id: s.source_id,
            document_name: s.document_name.clone(),
            page_start: s.page_start,
            page_end: s.page_end,
            snippet: s.snippet.clone(),
        }
    }
}
