//! Ingestion Pipeline — orchestrates extract -> detect-language -> chunk ->
//! embed -> index -> commit for one document (spec.md §4.2).
//!
//! Grounded on `api/handlers/rag.rs`'s `ingest()` handler flow (chunk ->
//! embed -> upsert, deterministic ids, structured tracing), generalized
//! from a single synchronous HTTP handler into a multi-stage worker that
//! records a `DocumentEvent` per stage and leaves the document in a
//! terminal `SUCCESS`/`FAILED` status rather than returning a response.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::chunker::Chunker;
use crate::embedder::Embedder;
use crate::extract;
use crate::language;
use crate::repository::{DocumentCommit, Repository};
use crate::storage::RawStorage;
use crate::types::{AppError, DocumentStatus, PipelineStage, Result, StageStatus};
use crate::vectorstore::{Distance, VectorPoint, VectorStore};

/// Bounded number of attempts for the embedding stage before the document
/// is marked FAILED (spec.md §4.2 step 5).
const EMBED_MAX_ATTEMPTS: u32 = 4;
const EMBED_BASE_BACKOFF: Duration = Duration::from_millis(200);

/// Batch size cap for a single `Embedder.encode` call.
const EMBED_BATCH_SIZE: usize = 32;

pub struct Pipeline {
    repository: Arc<dyn Repository>,
    raw_storage: Arc<dyn RawStorage>,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
}

impl Pipeline {
    pub fn new(
        repository: Arc<dyn Repository>,
        raw_storage: Arc<dyn RawStorage>,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            repository,
            raw_storage,
            vector_store,
            embedder,
            chunker: Chunker::new(chunk_size, chunk_overlap),
        }
    }

    /// Runs the full ingestion pipeline for `document_id`, end to end.
    /// Every failure path marks the document FAILED (with a short
    /// `error_message`) and returns `Ok(())` rather than propagating the
    /// error — a pipeline run's own failure is a recorded document state,
    /// not a caller-visible error (spec.md §4.2, §7 "the pipeline never
    /// throws up to the HTTP layer").
    pub async fn run(&self, document_id: Uuid) -> Result<()> {
        let document = self.repository.get_document(document_id).await?;

        // Step 1: mark PROCESSING, open the blob.
        self.repository
            .update_document_status(document_id, DocumentStatus::Processing, None)
            .await?;

        let object = match self.raw_storage.get(&document.raw_storage_path).await {
            Ok(obj) => obj,
            Err(e) => {
                return self.fail(document_id, &format!("failed to open raw blob: {e}")).await;
            }
        };
        let bytes = match read_all(object.stream).await {
            Ok(b) => b,
            Err(e) => {
                return self.fail(document_id, &format!("failed to read raw blob: {e}")).await;
            }
        };

        // Step 2: extract.
        let extract_start = Instant::now();
        self.stage_start(document_id, PipelineStage::Extracting).await;
        let extracted = match extract::detect(&bytes) {
            Ok((_, extractor)) => match extractor.extract(&bytes).await {
                Ok(doc) => doc,
                Err(e) => {
                    self.stage_failed(document_id, PipelineStage::Extracting, extract_start)
                        .await;
                    return self.fail(document_id, &format!("extraction failed: {e}")).await;
                }
            },
            Err(AppError::UnsupportedMedia(msg)) => {
                self.stage_failed(document_id, PipelineStage::Extracting, extract_start)
                    .await;
                self.repository
                    .update_document_status(
                        document_id,
                        DocumentStatus::Failed,
                        Some("unsupported media type"),
                    )
                    .await?;
                // Unsupported media is the one failure mode that deletes
                // the blob (spec.md §4.2 step 2).
                self.raw_storage.delete(&document.raw_storage_path).await?;
                tracing::warn!(document_id = %document_id, error = %msg, "unsupported media type");
                return Ok(());
            }
            Err(e) => {
                self.stage_failed(document_id, PipelineStage::Extracting, extract_start)
                    .await;
                return self.fail(document_id, &format!("mime detection failed: {e}")).await;
            }
        };
        self.stage_success(document_id, PipelineStage::Extracting, extract_start)
            .await;

        // Step 3: detect language (non-fatal).
        let lang_start = Instant::now();
        self.stage_start(document_id, PipelineStage::LangDetect).await;
        let detected_language = language::detect(&extracted.pages);
        self.stage_success(document_id, PipelineStage::LangDetect, lang_start)
            .await;

        // The classification stage has no described pipeline work (spec.md
        // §9 open question); record it as skipped.
        self.repository
            .upsert_stage_event(
                document_id,
                PipelineStage::Classification,
                StageStatus::Skipped,
                Some(0),
            )
            .await?;

        // Step 4: chunk.
        let chunk_start = Instant::now();
        self.stage_start(document_id, PipelineStage::Chunking).await;
        let chunks = self.chunker.chunk_pages(
            document.workspace_id,
            document_id,
            &document.document_name,
            &extracted.pages,
        );
        if chunks.is_empty() {
            self.stage_failed(document_id, PipelineStage::Chunking, chunk_start)
                .await;
            return self.fail(document_id, "chunking produced no segments").await;
        }
        self.stage_success(document_id, PipelineStage::Chunking, chunk_start)
            .await;

        // Step 5: embed, with bounded retry/backoff on transient failure.
        let embed_start = Instant::now();
        self.stage_start(document_id, PipelineStage::Embedding).await;
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = match self.embed_with_retry(&texts).await {
            Ok(v) => v,
            Err(e) => {
                self.stage_failed(document_id, PipelineStage::Embedding, embed_start)
                    .await;
                return self.fail(document_id, &format!("embedding failed: {e}")).await;
            }
        };
        self.stage_success(document_id, PipelineStage::Embedding, embed_start)
            .await;

        self.vector_store
            .ensure_collection(self.embedder.dim(), Distance::Cosine)
            .await?;

        // Step 6: index with deterministic, idempotent chunk ids.
        let points = chunks
            .iter()
            .zip(vectors.into_iter())
            .map(|(chunk, vector)| VectorPoint {
                id: deterministic_chunk_id(document_id, chunk.chunk_index),
                vector,
                payload: crate::types::VectorPayload {
                    workspace_id: chunk.workspace_id,
                    document_id: chunk.document_id,
                    document_name: chunk.document_name.clone(),
                    page_start: chunk.page_start,
                    page_end: chunk.page_end,
                    snippet: chunk.snippet.clone(),
                },
            })
            .collect();
        self.vector_store.upsert(points).await?;

        // Step 7: commit.
        self.repository
            .commit_document(
                document_id,
                DocumentCommit {
                    detected_language,
                    page_count: Some(extracted.page_count()),
                    author: extracted.author,
                    creation_date: extracted.creation_date,
                },
            )
            .await?;

        tracing::info!(document_id = %document_id, chunks = chunks.len(), "ingestion succeeded");
        Ok(())
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            out.extend(self.embed_batch_with_retry(batch.to_vec()).await?);
        }
        Ok(out)
    }

    async fn embed_batch_with_retry(&self, batch: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.embedder.encode(batch.clone()).await {
                Ok(vectors) => return Ok(vectors),
                Err(AppError::Transient(msg)) if attempt < EMBED_MAX_ATTEMPTS => {
                    let backoff = EMBED_BASE_BACKOFF * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        attempt,
                        error = %msg,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient embedding failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fail(&self, document_id: Uuid, message: &str) -> Result<()> {
        tracing::error!(document_id = %document_id, error = message, "ingestion failed");
        self.repository
            .update_document_status(document_id, DocumentStatus::Failed, Some(message))
            .await
    }

    async fn stage_start(&self, document_id: Uuid, stage: PipelineStage) {
        tracing::info!(document_id = %document_id, stage = %stage, "stage starting");
        let _ = self
            .repository
            .upsert_stage_event(document_id, stage, StageStatus::Processing, None)
            .await;
    }

    async fn stage_success(&self, document_id: Uuid, stage: PipelineStage, start: Instant) {
        let duration_ms = start.elapsed().as_millis() as i64;
        tracing::info!(document_id = %document_id, stage = %stage, duration_ms, "stage succeeded");
        let _ = self
            .repository
            .upsert_stage_event(document_id, stage, StageStatus::Success, Some(duration_ms))
            .await;
    }

    async fn stage_failed(&self, document_id: Uuid, stage: PipelineStage, start: Instant) {
        let duration_ms = start.elapsed().as_millis() as i64;
        tracing::warn!(document_id = %document_id, stage = %stage, duration_ms, "stage failed");
        let _ = self
            .repository
            .upsert_stage_event(document_id, stage, StageStatus::Failed, Some(duration_ms))
            .await;
    }
}

/// Deterministic from `(document_id, chunk_index)` so re-running the
/// pipeline for the same document upserts the same ids (spec.md §4.2
/// step 6, §8 idempotence property).
fn deterministic_chunk_id(document_id: Uuid, chunk_index: usize) -> Uuid {
    let namespace = Uuid::NAMESPACE_OID;
    let name = format!("{document_id}:{chunk_index}");
    Uuid::new_v5(&namespace, name.as_bytes())
}

async fn read_all(
    mut stream: futures::stream::BoxStream<'static, std::io::Result<bytes::Bytes>>,
) -> std::result::Result<Vec<u8>, std::io::Error> {
    use futures::StreamExt;
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqlRepository;
    use crate::storage::LocalRawStorage;
    use crate::vectorstore::LocalVectorStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Builds a minimal but structurally valid single-page PDF containing
    /// `text`, so tests can exercise the real MIME-sniff -> extract path
    /// instead of bytes `infer`/`pdf-extract` would reject.
    fn minimal_pdf(text: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut offsets = Vec::new();
        buf.extend_from_slice(b"%PDF-1.4\n");

        let mut push_obj = |buf: &mut Vec<u8>, id: usize, body: String| {
            offsets.push((id, buf.len()));
            buf.extend_from_slice(format!("{id} 0 obj\n{body}\nendobj\n").as_bytes());
        };

        push_obj(&mut buf, 1, "<< /Type /Catalog /Pages 2 0 R >>".to_string());
        push_obj(
            &mut buf,
            2,
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        );
        push_obj(
            &mut buf,
            3,
            "<< /Type /Page /Parent 2 0 R /Resources << /Font << /F1 5 0 R >> >> \
             /MediaBox [0 0 612 792] /Contents 4 0 R >>"
                .to_string(),
        );
        let stream = format!("BT /F1 24 Tf 72 700 Td ({text}) Tj ET");
        push_obj(
            &mut buf,
            4,
            format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()),
        );
        push_obj(
            &mut buf,
            5,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        );

        let xref_offset = buf.len();
        buf.extend_from_slice(b"xref\n0 6\n0000000000 65535 f \n");
        for (_, offset) in &offsets {
            buf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        buf.extend_from_slice(
            format!("trailer\n<< /Size 6 /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF")
                .as_bytes(),
        );
        buf
    }

    struct FlakyEmbedder {
        calls: AtomicUsize,
        dim: usize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                return Err(AppError::Transient("simulated outage".into()));
            }
            Ok(texts.iter().map(|_| vec![0.1_f32; self.dim]).collect())
        }

        fn dim(&self) -> usize {
            self.dim
        }
    }

    async fn setup() -> (
        Pipeline,
        Arc<SqlRepository>,
        Arc<LocalRawStorage>,
        Uuid,
        Uuid,
    ) {
        let repo = Arc::new(SqlRepository::open_local(":memory:").await.unwrap());
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalRawStorage::new(dir.path()));
        let vector_dir = tempfile::tempdir().unwrap();
        let vector_store = Arc::new(
            LocalVectorStore::new(vector_dir.path().join("vectors.json")).unwrap(),
        );
        let embedder = Arc::new(FlakyEmbedder {
            calls: AtomicUsize::new(0),
            dim: 8,
        });

        let pipeline = Pipeline::new(
            repo.clone() as Arc<dyn Repository>,
            storage.clone() as Arc<dyn RawStorage>,
            vector_store as Arc<dyn VectorStore>,
            embedder as Arc<dyn Embedder>,
            50,
            10,
        );

        let workspace = repo.create_workspace("acme").await.unwrap();
        let path = crate::storage::object_path(workspace.id, Uuid::new_v4(), "doc.pdf");
        let bytes = minimal_pdf("alpha beta gamma delta epsilon zeta");
        let size = bytes.len() as i64;
        storage.put(&path, bytes).await.unwrap();
        let document = repo
            .create_document(
                workspace.id,
                "doc.pdf",
                "application/pdf",
                "deadbeef",
                &path,
                size,
            )
            .await
            .unwrap();

        (pipeline, repo, storage, workspace.id, document.id)
    }

    #[tokio::test]
    async fn unsupported_media_marks_failed_and_deletes_blob() {
        let repo = Arc::new(SqlRepository::open_local(":memory:").await.unwrap());
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalRawStorage::new(dir.path()));
        let vector_dir = tempfile::tempdir().unwrap();
        let vector_store = Arc::new(
            LocalVectorStore::new(vector_dir.path().join("vectors.json")).unwrap(),
        );
        let embedder = Arc::new(crate::embedder::StubEmbedder::new(8));

        let pipeline = Pipeline::new(
            repo.clone() as Arc<dyn Repository>,
            storage.clone() as Arc<dyn RawStorage>,
            vector_store as Arc<dyn VectorStore>,
            embedder as Arc<dyn Embedder>,
            50,
            10,
        );

        let workspace = repo.create_workspace("acme2").await.unwrap();
        let path = crate::storage::object_path(workspace.id, Uuid::new_v4(), "image.png");
        storage.put(&path, b"\x89PNG\r\n\x1a\nnotreallyapng".to_vec()).await.unwrap();
        let document = repo
            .create_document(workspace.id, "image.png", "image/png", "deadbeef", &path, 20)
            .await
            .unwrap();

        pipeline.run(document.id).await.unwrap();

        let refreshed = repo.get_document(document.id).await.unwrap();
        assert_eq!(refreshed.status, DocumentStatus::Failed);
        assert!(!storage.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn transient_embedder_failure_still_reaches_success() {
        let (pipeline, repo, _storage, _workspace_id, document_id) = setup().await;
        pipeline.run(document_id).await.unwrap();

        let refreshed = repo.get_document(document_id).await.unwrap();
        assert_eq!(refreshed.status, DocumentStatus::Success);
        assert_eq!(refreshed.page_count, Some(1));
    }

    #[tokio::test]
    async fn deterministic_chunk_ids_are_stable_across_runs() {
        let id = Uuid::new_v4();
        assert_eq!(deterministic_chunk_id(id, 0), deterministic_chunk_id(id, 0));
        assert_ne!(deterministic_chunk_id(id, 0), deterministic_chunk_id(id, 1));
    }
}
