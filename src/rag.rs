//! RAG Engine — embed -> search -> assemble -> generate -> persist
//! (spec.md §4.3).
//!
//! Grounded on `api/handlers/rag.rs`'s `search()` handler flow (embed the
//! query, vector search, shape results), generalized from a stateless
//! search-only endpoint into the full question-answering turn: session
//! resolution, context assembly with dialogue history, LLM invocation, and
//! persistence of the turn as a single unit of work.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::embedder::Embedder;
use crate::llm::{GenParams, LLMClient};
use crate::repository::{NewSourceRef, Repository};
use crate::types::{AppError, ChatMessage, MessageRole, Result, SearchHit, VectorFilter};
use crate::vectorstore::VectorStore;

const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant. Answer the question using only \
the numbered context passages below. If the passages don't contain the answer, say so plainly.";

const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been ingested into this workspace yet, so there is nothing to answer from.";

pub struct AskInput {
    pub workspace_id: Uuid,
    pub question: String,
    pub top_k: usize,
    pub session_id: Option<Uuid>,
}

pub struct AskOutput {
    pub answer: String,
    pub sources: Vec<NewSourceRef>,
    pub session_id: Uuid,
}

pub struct RagEngine {
    repository: Arc<dyn Repository>,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LLMClient>,
    llm_model: String,
    history_n: usize,
}

impl RagEngine {
    pub fn new(
        repository: Arc<dyn Repository>,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LLMClient>,
        llm_model: String,
        history_n: usize,
    ) -> Self {
        Self {
            repository,
            vector_store,
            embedder,
            llm,
            llm_model,
            history_n,
        }
    }

    pub async fn ask(&self, input: AskInput) -> Result<AskOutput> {
        // Step 1: resolve session.
        let session_id = match input.session_id {
            Some(id) => {
                let session = self.repository.get_session(id).await?;
                if session.workspace_id != input.workspace_id {
                    return Err(AppError::NotFound(format!(
                        "session {id} does not belong to workspace {}",
                        input.workspace_id
                    )));
                }
                id
            }
            None => self.repository.create_session(input.workspace_id).await?.id,
        };

        // Step 2: embed the question.
        let mut vectors = self.embedder.encode(vec![input.question.clone()]).await?;
        let question_vector = vectors
            .pop()
            .ok_or_else(|| AppError::Internal("embedder returned no vector for question".into()))?;

        // Step 3: filtered similarity search, with the zero-documents
        // short-circuit.
        let hits = self
            .vector_store
            .search(
                &question_vector,
                input.top_k,
                VectorFilter::workspace(input.workspace_id),
            )
            .await?;

        if hits.is_empty() {
            self.repository
                .record_turn(session_id, &input.question, NO_DOCUMENTS_ANSWER, vec![])
                .await?;
            return Ok(AskOutput {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                sources: Vec::new(),
                session_id,
            });
        }

        // Step 4: dedup sources by (document_id, page_start, page_end),
        // keeping the highest-similarity occurrence.
        let sources = dedup_sources(hits);

        // Step 5: fetch recent history, oldest->newest.
        let history = self
            .repository
            .recent_messages(session_id, self.history_n)
            .await?;

        // Step 6: assemble the prompt.
        let prompt = build_prompt(&input.question, &sources, &history);

        // Step 7: generate.
        let params = GenParams {
            model: self.llm_model.clone(),
            temperature: 0.0,
            ..GenParams::default()
        };
        let answer = self.llm.generate(&prompt, &params).await?;

        // Step 8: persist the turn as a single unit of work.
        self.repository
            .record_turn(session_id, &input.question, &answer, sources.clone())
            .await?;

        // Step 9: return.
        Ok(AskOutput {
            answer,
            sources,
            session_id,
        })
    }
}

/// Keeps, for each `(document_id, page_start, page_end)`, only the
/// highest-scoring hit, then orders by descending score.
fn dedup_sources(hits: Vec<SearchHit>) -> Vec<NewSourceRef> {
    let mut best: HashMap<(Uuid, i64, i64), SearchHit> = HashMap::new();
    for hit in hits {
        let key = (
            hit.payload.document_id,
            hit.payload.page_start,
            hit.payload.page_end,
        );
        match best.get(&key) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(key, hit);
            }
        }
    }
    let mut ordered: Vec<SearchHit> = best.into_values().collect();
    ordered.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ordered
        .into_iter()
        .map(|hit| NewSourceRef {
            source_id: hit.payload.document_id,
            document_name: hit.payload.document_name,
            page_start: hit.payload.page_start,
            page_end: hit.payload.page_end,
            snippet: hit.payload.snippet,
        })
        .collect()
}

fn build_prompt(question: &str, sources: &[NewSourceRef], history: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    prompt.push_str(SYSTEM_INSTRUCTION);
    prompt.push_str("\n\n");

    for (i, source) in sources.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] {} (p.{}-{}): {}\n",
            i + 1,
            source.document_name,
            source.page_start,
            source.page_end,
            source.snippet
        ));
    }

    if !history.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        for message in history {
            let role = match message.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{role}: {}\n", message.content));
        }
    }

    prompt.push_str(&format!("\nQuestion: {question}\nAnswer:"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::StubEmbedder;
    use crate::llm::StubLlmClient;
    use crate::repository::SqlRepository;
    use crate::types::VectorPayload;
    use crate::vectorstore::{Distance, LocalVectorStore, VectorPoint};

    async fn engine() -> (RagEngine, Arc<SqlRepository>, Arc<LocalVectorStore>, Uuid) {
        let repo = Arc::new(SqlRepository::open_local(":memory:").await.unwrap());
        let dir = tempfile::tempdir().unwrap();
        let vector_store = Arc::new(LocalVectorStore::new(dir.path().join("v.json")).unwrap());
        let embedder = Arc::new(StubEmbedder::new(8));
        let llm = Arc::new(StubLlmClient);

        let workspace = repo.create_workspace("acme").await.unwrap();

        let engine = RagEngine::new(
            repo.clone() as Arc<dyn Repository>,
            vector_store.clone() as Arc<dyn VectorStore>,
            embedder as Arc<dyn Embedder>,
            llm as Arc<dyn LLMClient>,
            "stub-model".to_string(),
            4,
        );
        (engine, repo, vector_store, workspace.id)
    }

    #[tokio::test]
    async fn empty_workspace_short_circuits_without_llm() {
        let (engine, _repo, _store, workspace_id) = engine().await;
        let output = engine
            .ask(AskInput {
                workspace_id,
                question: "what is on page 2?".to_string(),
                top_k: 3,
                session_id: None,
            })
            .await
            .unwrap();
        assert_eq!(output.answer, NO_DOCUMENTS_ANSWER);
        assert!(output.sources.is_empty());
    }

    #[tokio::test]
    async fn ask_with_documents_returns_sources_and_persists_turn() {
        let (engine, repo, store, workspace_id) = engine().await;
        store.ensure_collection(8, Distance::Cosine).await.unwrap();
        let document_id = Uuid::new_v4();
        store
            .upsert(vec![VectorPoint {
                id: Uuid::new_v4(),
                vector: StubEmbedder::new(8)
                    .encode(vec!["gamma content".to_string()])
                    .await
                    .unwrap()
                    .pop()
                    .unwrap(),
                payload: VectorPayload {
                    workspace_id,
                    document_id,
                    document_name: "doc.pdf".to_string(),
                    page_start: 2,
                    page_end: 2,
                    snippet: "gamma content".to_string(),
                },
            }])
            .await
            .unwrap();

        let output = engine
            .ask(AskInput {
                workspace_id,
                question: "gamma content".to_string(),
                top_k: 3,
                session_id: None,
            })
            .await
            .unwrap();

        assert_eq!(output.sources.len(), 1);
        assert_eq!(output.sources[0].document_name, "doc.pdf");
        assert!(output.sources[0].page_start <= 2 && 2 <= output.sources[0].page_end);
        assert!(!output.answer.is_empty());

        let messages = repo
            .list_messages_by_session(output.session_id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn unknown_session_id_is_not_found() {
        let (engine, _repo, _store, workspace_id) = engine().await;
        let err = engine
            .ask(AskInput {
                workspace_id,
                question: "hi".to_string(),
                top_k: 3,
                session_id: Some(Uuid::new_v4()),
            })
            .await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[test]
    fn dedup_keeps_highest_scoring_occurrence() {
        let document_id = Uuid::new_v4();
        let payload = |score: f32| SearchHit {
            score,
            payload: VectorPayload {
                workspace_id: Uuid::new_v4(),
                document_id,
                document_name: "doc.pdf".to_string(),
                page_start: 1,
                page_end: 1,
                snippet: format!("score {score}"),
            },
        };
        let deduped = dedup_sources(vec![payload(0.5), payload(0.9), payload(0.2)]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].snippet, "score 0.9");
    }
}
