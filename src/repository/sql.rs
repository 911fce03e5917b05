use chrono::{DateTime, Utc};
use libsql::{params, Builder, Connection, Database};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::{
    AppError, ChatMessage, ChatSession, Document, DocumentEvent, DocumentStatus, MessageRole,
    PipelineStage, Result, StageStatus, Workspace,
};

use super::{DocumentCommit, NewSource, NewSourceRef, Repository};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    document_name TEXT NOT NULL,
    media_type TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    raw_storage_path TEXT NOT NULL,
    page_count INTEGER,
    author TEXT,
    creation_date TEXT,
    detected_language TEXT,
    size_bytes INTEGER NOT NULL,
    ingested_at TEXT,
    status TEXT NOT NULL,
    error_message TEXT
);
CREATE INDEX IF NOT EXISTS idx_documents_workspace ON documents(workspace_id);

CREATE TABLE IF NOT EXISTS document_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    duration_ms INTEGER,
    UNIQUE(document_id, stage)
);

CREATE TABLE IF NOT EXISTS chat_sessions (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_workspace ON chat_sessions(workspace_id);

CREATE TABLE IF NOT EXISTS chat_messages (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON chat_messages(session_id);

CREATE TABLE IF NOT EXISTS chat_message_sources (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    source_id TEXT NOT NULL,
    document_name TEXT NOT NULL,
    page_start INTEGER NOT NULL,
    page_end INTEGER NOT NULL,
    snippet TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sources_message ON chat_message_sources(message_id);
"#;

/// libsql-backed `Repository`. A `DATABASE_URL` of the form
/// `libsql://...`/`https://...` (with `DATABASE_AUTH_TOKEN`) selects the
/// remote Turso-hosted mode; otherwise a local embedded file under
/// `./local_storage/metadata.db` is used (spec.md §4.5). One client type
/// handles both, the same way this codebase's own `TursoClient` does.
///
/// Writes are serialized behind a mutex rather than relying on libsql's
/// own connection pooling, mirroring `TursoClient`'s single-connection
/// pattern.
pub struct SqlRepository {
    conn: Mutex<Connection>,
}

impl SqlRepository {
    pub async fn open_local(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Internal(format!("creating local_storage dir: {e}")))?;
        }
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AppError::Internal(format!("opening local database: {e}")))?;
        Self::from_database(db).await
    }

    pub async fn open_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await
            .map_err(|e| AppError::Transient(format!("connecting to remote database: {e}")))?;
        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| AppError::Internal(format!("opening database connection: {e}")))?;
        conn.execute_batch(SCHEMA)
            .await
            .map_err(|e| AppError::Internal(format!("running schema migration: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn db_err(e: libsql::Error) -> AppError {
        AppError::Transient(format!("database error: {e}"))
    }
}

fn parse_status(s: &str) -> DocumentStatus {
    match s {
        "QUEUED" => DocumentStatus::Queued,
        "PROCESSING" => DocumentStatus::Processing,
        "SUCCESS" => DocumentStatus::Success,
        "FAILED" => DocumentStatus::Failed,
        "SKIPPED" => DocumentStatus::Skipped,
        _ => DocumentStatus::Pending,
    }
}

fn parse_stage(s: &str) -> PipelineStage {
    match s {
        "CHUNKING" => PipelineStage::Chunking,
        "EMBEDDING" => PipelineStage::Embedding,
        "CLASSIFICATION" => PipelineStage::Classification,
        "LANG_DETECT" => PipelineStage::LangDetect,
        _ => PipelineStage::Extracting,
    }
}

fn parse_stage_status(s: &str) -> StageStatus {
    match s {
        "SUCCESS" => StageStatus::Success,
        "FAILED" => StageStatus::Failed,
        "SKIPPED" => StageStatus::Skipped,
        _ => StageStatus::Processing,
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_document(row: &libsql::Row) -> Result<Document> {
    let id: String = row.get(0).map_err(SqlRepository::db_err)?;
    let workspace_id: String = row.get(1).map_err(SqlRepository::db_err)?;
    let ingested_at: Option<String> = row.get(10).map_err(SqlRepository::db_err)?;
    let status: String = row.get(11).map_err(SqlRepository::db_err)?;
    Ok(Document {
        id: id.parse().map_err(|_| AppError::Internal("corrupt document id".into()))?,
        workspace_id: workspace_id
            .parse()
            .map_err(|_| AppError::Internal("corrupt workspace id".into()))?,
        document_name: row.get(2).map_err(SqlRepository::db_err)?,
        media_type: row.get(3).map_err(SqlRepository::db_err)?,
        sha256: row.get(4).map_err(SqlRepository::db_err)?,
        raw_storage_path: row.get(5).map_err(SqlRepository::db_err)?,
        page_count: row.get(6).map_err(SqlRepository::db_err)?,
        author: row.get(7).map_err(SqlRepository::db_err)?,
        creation_date: row.get(8).map_err(SqlRepository::db_err)?,
        detected_language: row.get(9).map_err(SqlRepository::db_err)?,
        size_bytes: row.get(12).map_err(SqlRepository::db_err)?,
        ingested_at: ingested_at.as_deref().map(parse_rfc3339),
        status: parse_status(&status),
        error_message: row.get(13).map_err(SqlRepository::db_err)?,
    })
}

#[async_trait::async_trait]
impl Repository for SqlRepository {
    async fn create_workspace(&self, name: &str) -> Result<Workspace> {
        let conn = self.conn.lock().await;
        let mut existing = conn
            .query("SELECT id FROM workspaces WHERE name = ?1", params![name])
            .await
            .map_err(Self::db_err)?;
        if existing.next().await.map_err(Self::db_err)?.is_some() {
            return Err(AppError::Conflict(format!(
                "workspace named '{name}' already exists"
            )));
        }

        let id = Uuid::new_v4();
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO workspaces (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id.to_string(), name, created_at.to_rfc3339()],
        )
        .await
        .map_err(Self::db_err)?;

        Ok(Workspace {
            id,
            name: name.to_string(),
            created_at,
        })
    }

    async fn get_workspace(&self, id: Uuid) -> Result<Workspace> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, name, created_at FROM workspaces WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(Self::db_err)?;
        let row = rows
            .next()
            .await
            .map_err(Self::db_err)?
            .ok_or_else(|| AppError::NotFound(format!("workspace {id} not found")))?;
        let created_at: String = row.get(2).map_err(Self::db_err)?;
        Ok(Workspace {
            id,
            name: row.get(1).map_err(Self::db_err)?,
            created_at: parse_rfc3339(&created_at),
        })
    }

    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, name, created_at FROM workspaces ORDER BY created_at ASC",
                params![],
            )
            .await
            .map_err(Self::db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Self::db_err)? {
            let id: String = row.get(0).map_err(Self::db_err)?;
            let created_at: String = row.get(2).map_err(Self::db_err)?;
            out.push(Workspace {
                id: id.parse().map_err(|_| AppError::Internal("corrupt workspace id".into()))?,
                name: row.get(1).map_err(Self::db_err)?,
                created_at: parse_rfc3339(&created_at),
            });
        }
        Ok(out)
    }

    async fn delete_workspace(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(Self::db_err)?;
        let ws = id.to_string();

        tx.execute(
            "DELETE FROM chat_message_sources WHERE message_id IN \
             (SELECT m.id FROM chat_messages m JOIN chat_sessions s ON m.session_id = s.id \
              WHERE s.workspace_id = ?1)",
            params![ws.clone()],
        )
        .await
        .map_err(Self::db_err)?;
        tx.execute(
            "DELETE FROM chat_messages WHERE session_id IN \
             (SELECT id FROM chat_sessions WHERE workspace_id = ?1)",
            params![ws.clone()],
        )
        .await
        .map_err(Self::db_err)?;
        tx.execute(
            "DELETE FROM chat_sessions WHERE workspace_id = ?1",
            params![ws.clone()],
        )
        .await
        .map_err(Self::db_err)?;
        tx.execute(
            "DELETE FROM document_events WHERE document_id IN \
             (SELECT id FROM documents WHERE workspace_id = ?1)",
            params![ws.clone()],
        )
        .await
        .map_err(Self::db_err)?;
        tx.execute(
            "DELETE FROM documents WHERE workspace_id = ?1",
            params![ws.clone()],
        )
        .await
        .map_err(Self::db_err)?;
        let affected = tx
            .execute("DELETE FROM workspaces WHERE id = ?1", params![ws])
            .await
            .map_err(Self::db_err)?;
        if affected == 0 {
            tx.rollback().await.map_err(Self::db_err)?;
            return Err(AppError::NotFound(format!("workspace {id} not found")));
        }
        tx.commit().await.map_err(Self::db_err)?;
        Ok(())
    }

    async fn create_document(
        &self,
        workspace_id: Uuid,
        document_name: &str,
        media_type: &str,
        sha256: &str,
        raw_storage_path: &str,
        size_bytes: i64,
    ) -> Result<Document> {
        let conn = self.conn.lock().await;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO documents \
             (id, workspace_id, document_name, media_type, sha256, raw_storage_path, \
              size_bytes, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'PENDING')",
            params![
                id.to_string(),
                workspace_id.to_string(),
                document_name,
                media_type,
                sha256,
                raw_storage_path,
                size_bytes
            ],
        )
        .await
        .map_err(Self::db_err)?;

        Ok(Document {
            id,
            workspace_id,
            document_name: document_name.to_string(),
            media_type: media_type.to_string(),
            sha256: sha256.to_string(),
            raw_storage_path: raw_storage_path.to_string(),
            page_count: None,
            author: None,
            creation_date: None,
            detected_language: None,
            size_bytes,
            ingested_at: None,
            status: DocumentStatus::Pending,
            error_message: None,
        })
    }

    async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let affected = conn
            .execute(
                "UPDATE documents SET status = ?1, error_message = ?2 WHERE id = ?3",
                params![status.to_string(), error_message, id.to_string()],
            )
            .await
            .map_err(Self::db_err)?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("document {id} not found")));
        }
        Ok(())
    }

    async fn commit_document(&self, id: Uuid, commit: DocumentCommit) -> Result<()> {
        let conn = self.conn.lock().await;
        let affected = conn
            .execute(
                "UPDATE documents SET detected_language = ?1, page_count = ?2, author = ?3, \
                 creation_date = ?4, ingested_at = ?5, status = 'SUCCESS', error_message = NULL \
                 WHERE id = ?6",
                params![
                    commit.detected_language,
                    commit.page_count,
                    commit.author,
                    commit.creation_date,
                    Utc::now().to_rfc3339(),
                    id.to_string()
                ],
            )
            .await
            .map_err(Self::db_err)?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("document {id} not found")));
        }
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Document> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, workspace_id, document_name, media_type, sha256, raw_storage_path, \
                 page_count, author, creation_date, detected_language, ingested_at, status, \
                 size_bytes, error_message FROM documents WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(Self::db_err)?;
        let row = rows
            .next()
            .await
            .map_err(Self::db_err)?
            .ok_or_else(|| AppError::NotFound(format!("document {id} not found")))?;
        row_to_document(&row)
    }

    async fn list_documents_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Document>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, workspace_id, document_name, media_type, sha256, raw_storage_path, \
                 page_count, author, creation_date, detected_language, ingested_at, status, \
                 size_bytes, error_message FROM documents WHERE workspace_id = ?1 \
                 ORDER BY rowid ASC",
                params![workspace_id.to_string()],
            )
            .await
            .map_err(Self::db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Self::db_err)? {
            out.push(row_to_document(&row)?);
        }
        Ok(out)
    }

    async fn delete_document(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(Self::db_err)?;
        let doc = id.to_string();
        tx.execute(
            "DELETE FROM document_events WHERE document_id = ?1",
            params![doc.clone()],
        )
        .await
        .map_err(Self::db_err)?;
        let affected = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![doc])
            .await
            .map_err(Self::db_err)?;
        if affected == 0 {
            tx.rollback().await.map_err(Self::db_err)?;
            return Err(AppError::NotFound(format!("document {id} not found")));
        }
        tx.commit().await.map_err(Self::db_err)?;
        Ok(())
    }

    async fn upsert_stage_event(
        &self,
        document_id: Uuid,
        stage: PipelineStage,
        status: StageStatus,
        duration_ms: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();
        let status_str = match status {
            StageStatus::Processing => "PROCESSING",
            StageStatus::Success => "SUCCESS",
            StageStatus::Failed => "FAILED",
            StageStatus::Skipped => "SKIPPED",
        };
        let finished_at = if matches!(status, StageStatus::Processing) {
            None
        } else {
            Some(now.clone())
        };
        conn.execute(
            "INSERT INTO document_events (document_id, stage, status, started_at, finished_at, duration_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(document_id, stage) DO UPDATE SET \
             status = excluded.status, finished_at = excluded.finished_at, duration_ms = excluded.duration_ms",
            params![
                document_id.to_string(),
                stage.to_string(),
                status_str,
                now,
                finished_at,
                duration_ms
            ],
        )
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }

    async fn list_events_by_document(&self, document_id: Uuid) -> Result<Vec<DocumentEvent>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, document_id, stage, status, started_at, finished_at, duration_ms \
                 FROM document_events WHERE document_id = ?1 ORDER BY id ASC",
                params![document_id.to_string()],
            )
            .await
            .map_err(Self::db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Self::db_err)? {
            let stage: String = row.get(2).map_err(Self::db_err)?;
            let status: String = row.get(3).map_err(Self::db_err)?;
            let started_at: String = row.get(4).map_err(Self::db_err)?;
            let finished_at: Option<String> = row.get(5).map_err(Self::db_err)?;
            out.push(DocumentEvent {
                id: row.get(0).map_err(Self::db_err)?,
                document_id,
                stage: parse_stage(&stage),
                status: parse_stage_status(&status),
                started_at: parse_rfc3339(&started_at),
                finished_at: finished_at.as_deref().map(parse_rfc3339),
                duration_ms: row.get(6).map_err(Self::db_err)?,
            });
        }
        Ok(out)
    }

    async fn create_session(&self, workspace_id: Uuid) -> Result<ChatSession> {
        let conn = self.conn.lock().await;
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO chat_sessions (id, workspace_id, created_at) VALUES (?1, ?2, ?3)",
            params![id.to_string(), workspace_id.to_string(), created_at.to_rfc3339()],
        )
        .await
        .map_err(Self::db_err)?;
        Ok(ChatSession {
            id,
            workspace_id,
            created_at,
        })
    }

    async fn get_session(&self, id: Uuid) -> Result<ChatSession> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT workspace_id, created_at FROM chat_sessions WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(Self::db_err)?;
        let row = rows
            .next()
            .await
            .map_err(Self::db_err)?
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
        let workspace_id: String = row.get(0).map_err(Self::db_err)?;
        let created_at: String = row.get(1).map_err(Self::db_err)?;
        Ok(ChatSession {
            id,
            workspace_id: workspace_id
                .parse()
                .map_err(|_| AppError::Internal("corrupt workspace id".into()))?,
            created_at: parse_rfc3339(&created_at),
        })
    }

    async fn list_sessions_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<ChatSession>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, created_at FROM chat_sessions WHERE workspace_id = ?1 ORDER BY created_at ASC",
                params![workspace_id.to_string()],
            )
            .await
            .map_err(Self::db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Self::db_err)? {
            let id: String = row.get(0).map_err(Self::db_err)?;
            let created_at: String = row.get(1).map_err(Self::db_err)?;
            out.push(ChatSession {
                id: id.parse().map_err(|_| AppError::Internal("corrupt session id".into()))?,
                workspace_id,
                created_at: parse_rfc3339(&created_at),
            });
        }
        Ok(out)
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(Self::db_err)?;
        let sid = id.to_string();
        tx.execute(
            "DELETE FROM chat_message_sources WHERE message_id IN \
             (SELECT id FROM chat_messages WHERE session_id = ?1)",
            params![sid.clone()],
        )
        .await
        .map_err(Self::db_err)?;
        tx.execute(
            "DELETE FROM chat_messages WHERE session_id = ?1",
            params![sid.clone()],
        )
        .await
        .map_err(Self::db_err)?;
        let affected = tx
            .execute("DELETE FROM chat_sessions WHERE id = ?1", params![sid])
            .await
            .map_err(Self::db_err)?;
        if affected == 0 {
            tx.rollback().await.map_err(Self::db_err)?;
            return Err(AppError::NotFound(format!("session {id} not found")));
        }
        tx.commit().await.map_err(Self::db_err)?;
        Ok(())
    }

    async fn create_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage> {
        let conn = self.conn.lock().await;
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let role_str = match role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        conn.execute(
            "INSERT INTO chat_messages (id, session_id, role, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                session_id.to_string(),
                role_str,
                content,
                created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(Self::db_err)?;
        Ok(ChatMessage {
            id,
            session_id,
            role,
            content: content.to_string(),
            created_at,
        })
    }

    async fn list_messages_by_session(&self, session_id: Uuid) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, role, content, created_at FROM chat_messages \
                 WHERE session_id = ?1 ORDER BY created_at ASC",
                params![session_id.to_string()],
            )
            .await
            .map_err(Self::db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Self::db_err)? {
            out.push(message_from_row(&row, session_id)?);
        }
        Ok(out)
    }

    async fn recent_messages(&self, session_id: Uuid, n: usize) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, role, content, created_at FROM chat_messages \
                 WHERE session_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                params![session_id.to_string(), n as i64],
            )
            .await
            .map_err(Self::db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Self::db_err)? {
            out.push(message_from_row(&row, session_id)?);
        }
        out.reverse();
        Ok(out)
    }

    async fn bulk_create_sources(&self, sources: Vec<NewSource>) -> Result<()> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(Self::db_err)?;
        for s in sources {
            tx.execute(
                "INSERT INTO chat_message_sources \
                 (id, message_id, source_id, document_name, page_start, page_end, snippet) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    Uuid::new_v4().to_string(),
                    s.message_id.to_string(),
                    s.source_id.to_string(),
                    s.document_name,
                    s.page_start,
                    s.page_end,
                    s.snippet
                ],
            )
            .await
            .map_err(Self::db_err)?;
        }
        tx.commit().await.map_err(Self::db_err)?;
        Ok(())
    }

    async fn record_turn(
        &self,
        session_id: Uuid,
        question: &str,
        answer: &str,
        sources: Vec<NewSourceRef>,
    ) -> Result<(ChatMessage, ChatMessage)> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(Self::db_err)?;

        let user_id = Uuid::new_v4();
        let user_created_at = Utc::now();
        tx.execute(
            "INSERT INTO chat_messages (id, session_id, role, content, created_at) \
             VALUES (?1, ?2, 'user', ?3, ?4)",
            params![
                user_id.to_string(),
                session_id.to_string(),
                question,
                user_created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(Self::db_err)?;

        let assistant_id = Uuid::new_v4();
        let assistant_created_at = Utc::now();
        tx.execute(
            "INSERT INTO chat_messages (id, session_id, role, content, created_at) \
             VALUES (?1, ?2, 'assistant', ?3, ?4)",
            params![
                assistant_id.to_string(),
                session_id.to_string(),
                answer,
                assistant_created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(Self::db_err)?;

        for s in sources {
            tx.execute(
                "INSERT INTO chat_message_sources \
                 (id, message_id, source_id, document_name, page_start, page_end, snippet) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    Uuid::new_v4().to_string(),
                    assistant_id.to_string(),
                    s.source_id.to_string(),
                    s.document_name,
                    s.page_start,
                    s.page_end,
                    s.snippet
                ],
            )
            .await
            .map_err(Self::db_err)?;
        }

        tx.commit().await.map_err(Self::db_err)?;

        Ok((
            ChatMessage {
                id: user_id,
                session_id,
                role: MessageRole::User,
                content: question.to_string(),
                created_at: user_created_at,
            },
            ChatMessage {
                id: assistant_id,
                session_id,
                role: MessageRole::Assistant,
                content: answer.to_string(),
                created_at: assistant_created_at,
            },
        ))
    }
}

fn message_from_row(row: &libsql::Row, session_id: Uuid) -> Result<ChatMessage> {
    let id: String = row.get(0).map_err(SqlRepository::db_err)?;
    let role: String = row.get(1).map_err(SqlRepository::db_err)?;
    let created_at: String = row.get(3).map_err(SqlRepository::db_err)?;
    Ok(ChatMessage {
        id: id.parse().map_err(|_| AppError::Internal("corrupt message id".into()))?,
        session_id,
        role: if role == "assistant" {
            MessageRole::Assistant
        } else {
            MessageRole::User
        },
        content: row.get(2).map_err(SqlRepository::db_err)?,
        created_at: parse_rfc3339(&created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqlRepository {
        SqlRepository::open_local(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_and_get_workspace() {
        let repo = repo().await;
        let ws = repo.create_workspace("acme").await.unwrap();
        let fetched = repo.get_workspace(ws.id).await.unwrap();
        assert_eq!(fetched.name, "acme");
    }

    #[tokio::test]
    async fn duplicate_workspace_name_is_conflict() {
        let repo = repo().await;
        repo.create_workspace("acme").await.unwrap();
        let err = repo.create_workspace("acme").await;
        assert!(matches!(err, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn delete_workspace_cascades_documents_and_sessions() {
        let repo = repo().await;
        let ws = repo.create_workspace("acme").await.unwrap();
        let doc = repo
            .create_document(ws.id, "a.pdf", "application/pdf", "deadbeef", "raw/a.pdf", 10)
            .await
            .unwrap();
        let session = repo.create_session(ws.id).await.unwrap();
        repo.create_message(session.id, MessageRole::User, "hi")
            .await
            .unwrap();

        repo.delete_workspace(ws.id).await.unwrap();

        assert!(matches!(
            repo.get_document(doc.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            repo.get_session(session.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            repo.get_workspace(ws.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn record_turn_persists_both_messages_and_sources() {
        let repo = repo().await;
        let ws = repo.create_workspace("acme").await.unwrap();
        let session = repo.create_session(ws.id).await.unwrap();
        let doc_id = Uuid::new_v4();
        let (user_msg, assistant_msg) = repo
            .record_turn(
                session.id,
                "what is this?",
                "it is a thing",
                vec![NewSourceRef {
                    source_id: doc_id,
                    document_name: "a.pdf".to_string(),
                    page_start: 1,
                    page_end: 2,
                    snippet: "thing...".to_string(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(assistant_msg.role, MessageRole::Assistant);

        let messages = repo.list_messages_by_session(session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn recent_messages_returns_last_n_in_order() {
        let repo = repo().await;
        let ws = repo.create_workspace("acme").await.unwrap();
        let session = repo.create_session(ws.id).await.unwrap();
        for i in 0..5 {
            repo.create_message(session.id, MessageRole::User, &format!("msg {i}"))
                .await
                .unwrap();
        }
        let recent = repo.recent_messages(session.id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "msg 3");
        assert_eq!(recent[1].content, "msg 4");
    }

    #[tokio::test]
    async fn upsert_stage_event_overwrites_same_stage() {
        let repo = repo().await;
        let ws = repo.create_workspace("acme").await.unwrap();
        let doc = repo
            .create_document(ws.id, "a.pdf", "application/pdf", "deadbeef", "raw/a.pdf", 10)
            .await
            .unwrap();
        repo.upsert_stage_event(doc.id, PipelineStage::Extracting, StageStatus::Processing, None)
            .await
            .unwrap();
        repo.upsert_stage_event(doc.id, PipelineStage::Extracting, StageStatus::Success, Some(42))
            .await
            .unwrap();
        let events = repo.list_events_by_document(doc.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, StageStatus::Success);
        assert_eq!(events[0].duration_ms, Some(42));
    }
}
