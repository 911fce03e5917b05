//! `LLMClient` — prompt-to-text adapter contract (spec.md §4.1).
//!
//! Retries and timeouts are the caller's (RAG Engine's) responsibility,
//! not the client's — the client call itself is a single blocking
//! request/response.

mod http;
mod stub;

pub use http::HttpLlmClient;
pub use stub::StubLlmClient;

use async_trait::async_trait;

use crate::types::Result;

/// Generation parameters recognized by every adapter (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct GenParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

impl Default for GenParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.2,
            max_tokens: 512,
            stop: Vec::new(),
        }
    }
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenParams) -> Result<String>;

    /// Lightweight reachability probe used by `GET /v1/ops/status`.
    async fn health_check(&self) -> bool;
}
