use async_trait::async_trait;

use crate::types::Result;

use super::{GenParams, LLMClient};

/// Deterministic stand-in LLM, selected when `LLM_URL` is unset
/// (spec.md §4.5) and used by the RAG-engine determinism test of
/// spec.md §8 ("mocking the LLM"). Never makes a network call; the
/// answer is built entirely from the prompt it was given, so identical
/// input always produces identical output.
pub struct StubLlmClient;

#[async_trait]
impl LLMClient for StubLlmClient {
    async fn generate(&self, prompt: &str, _params: &GenParams) -> Result<String> {
        let question = prompt
            .lines()
            .last()
            .unwrap_or(prompt)
            .trim()
            .to_string();
        Ok(format!("[stub answer] {question}"))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_prompt_yields_same_answer() {
        let client = StubLlmClient;
        let params = GenParams::default();
        let a = client.generate("context\n\nwhat is stratum?", &params).await.unwrap();
        let b = client.generate("context\n\nwhat is stratum?", &params).await.unwrap();
        assert_eq!(a, b);
    }
}
