use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{AppError, Result};

use super::{GenParams, LLMClient};

/// HTTP-backed LLM adapter, selected when `LLM_URL` is set (spec.md §4.5).
/// Speaks the Ollama-compatible `/api/generate` JSON protocol over
/// `reqwest`, the same transport this codebase already uses for every
/// other networked adapter; `OllamaClient`'s URL-normalization — accepting
/// `http://host:port`, bare `host:port`, or a bare hostname — is kept here
/// verbatim rather than depending on the `ollama-rs` crate directly.
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl HttpLlmClient {
    pub fn new(url: &str, default_model: &str) -> Result<Self> {
        let base_url = normalize_base_url(url)?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            default_model: default_model.to_string(),
        })
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Internal(
            "LLM_URL is empty; expected something like http://localhost:11434".to_string(),
        ));
    }
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    let host_port = without_scheme
        .split(&['/', '?', '#'][..])
        .next()
        .unwrap_or(without_scheme);
    Ok(format!("http://{host_port}"))
}

#[async_trait]
impl LLMClient for HttpLlmClient {
    async fn generate(&self, prompt: &str, params: &GenParams) -> Result<String> {
        let model = if params.model.is_empty() {
            &self.default_model
        } else {
            &params.model
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    temperature: params.temperature,
                    num_predict: params.max_tokens,
                    stop: params.stop.clone(),
                },
            })
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("LLM request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Transient(format!("LLM returned status {status}")));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Transient(format!("parsing LLM response: {e}")))?;
        Ok(body.response)
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_host_port() {
        assert_eq!(normalize_base_url("localhost:11434").unwrap(), "http://localhost:11434");
    }

    #[test]
    fn strips_scheme_and_path() {
        assert_eq!(
            normalize_base_url("http://example.com:11434/api").unwrap(),
            "http://example.com:11434"
        );
    }

    #[test]
    fn rejects_empty_url() {
        assert!(normalize_base_url("  ").is_err());
    }
}
