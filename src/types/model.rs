use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A workspace: the isolation boundary for documents, sessions, and
/// retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Queued,
    Processing,
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Queued => "QUEUED",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Success => "SUCCESS",
            DocumentStatus::Failed => "FAILED",
            DocumentStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// One ingested binary file plus its derived metadata. The text, chunks,
/// and vectors it owns live in the vector store and are not held here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub document_name: String,
    pub media_type: String,
    pub sha256: String,
    pub raw_storage_path: String,
    pub page_count: Option<i64>,
    pub author: Option<String>,
    pub creation_date: Option<String>,
    pub detected_language: Option<String>,
    pub size_bytes: i64,
    pub ingested_at: Option<DateTime<Utc>>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
}

/// A pipeline stage that a document passes through during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Extracting,
    Chunking,
    Embedding,
    Classification,
    LangDetect,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineStage::Extracting => "EXTRACTING",
            PipelineStage::Chunking => "CHUNKING",
            PipelineStage::Embedding => "EMBEDDING",
            PipelineStage::Classification => "CLASSIFICATION",
            PipelineStage::LangDetect => "LANG_DETECT",
        };
        f.write_str(s)
    }
}

/// Status of a single pipeline-stage event. Mirrors `DocumentStatus` but is
/// kept distinct because a stage can be `Skipped` independently of the
/// document's overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Processing,
    Success,
    Failed,
    Skipped,
}

/// A record of one pipeline stage's start/end for one document. Unique on
/// `(document_id, stage)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEvent {
    pub id: i64,
    pub document_id: Uuid,
    pub stage: PipelineStage,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// An ordered sequence of user/assistant messages within a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Role of a chat message's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single message in a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A reference, attached to an assistant message, to the chunk(s) that
/// supported it. Canonical shape per SPEC_FULL.md's Open Question
/// resolution: `source_id` aliases `document_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageSource {
    pub id: Uuid,
    pub message_id: Uuid,
    pub source_id: Uuid,
    pub document_name: String,
    pub page_start: i64,
    pub page_end: i64,
    pub snippet: String,
}

/// The payload carried by every point in the vector store. Every indexed
/// vector carries `workspace_id` so search can be filtered to one
/// workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPayload {
    pub workspace_id: Uuid,
    pub document_id: Uuid,
    pub document_name: String,
    pub page_start: i64,
    pub page_end: i64,
    pub snippet: String,
}

/// A candidate passage returned by a vector search, before dedup/assembly.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub payload: VectorPayload,
}

/// An equality filter over vector payload fields, as accepted by
/// `VectorStore::search`/`delete_by_filter`.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub workspace_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
}

impl VectorFilter {
    pub fn workspace(workspace_id: Uuid) -> Self {
        Self {
            workspace_id: Some(workspace_id),
            document_id: None,
        }
    }

    pub fn document(workspace_id: Uuid, document_id: Uuid) -> Self {
        Self {
            workspace_id: Some(workspace_id),
            document_id: Some(document_id),
        }
    }

    pub fn matches(&self, payload: &VectorPayload) -> bool {
        if let Some(ws) = self.workspace_id {
            if payload.workspace_id != ws {
                return false;
            }
        }
        if let Some(doc) = self.document_id {
            if payload.document_id != doc {
                return false;
            }
        }
        true
    }
}

// ============= DTOs for the thin HTTP surface (§6) =============

#[derive(Debug, Serialize)]
pub struct WorkspaceDto {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Workspace> for WorkspaceDto {
    fn from(w: Workspace) -> Self {
        Self {
            id: w.id,
            name: w.name,
            created_at: w.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentMetaDto {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub document_name: String,
    pub media_type: String,
    pub status: DocumentStatus,
    pub page_count: Option<i64>,
    pub detected_language: Option<String>,
    pub error_message: Option<String>,
}

impl From<Document> for DocumentMetaDto {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            workspace_id: d.workspace_id,
            document_name: d.document_name,
            media_type: d.media_type,
            status: d.status,
            page_count: d.page_count,
            detected_language: d.detected_language,
            error_message: d.error_message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatSessionDto {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<ChatSession> for ChatSessionDto {
    fn from(s: ChatSession) -> Self {
        Self {
            id: s.id,
            workspace_id: s.workspace_id,
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatMessageDto {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for ChatMessageDto {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            role: m.role,
            content: m.content,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SourceDto {
    pub source_id: Uuid,
    pub document_name: String,
    pub page_start: i64,
    pub page_end: i64,
    pub snippet: String,
}

impl From<ChatMessageSource> for SourceDto {
    fn from(s: ChatMessageSource) -> Self {
        Self {
            source_id: s.source_id,
            document_name: s.document_name,
            page_start: s.page_start,
            page_end: s.page_end,
            snippet: s.snippet,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub workspace_id: Uuid,
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SourceDto>,
    pub session_id: Uuid,
}
