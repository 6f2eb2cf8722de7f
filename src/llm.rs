//! Hosted LLM client.
//!
//! [`Llm`] is the seam between answer generation and the completion
//! service; [`GeminiLlm`] is the production implementation, calling the
//! Gemini `generateContent` REST endpoint. Retry policy lives one layer up
//! in [`crate::answer`]; this client makes exactly one attempt per call.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::{LlmConfig, LLM_API_KEY_VAR};
use crate::error::RagError;

/// Single-prompt completion capability.
#[async_trait]
pub trait Llm: Send + Sync {
    /// One completion attempt. Transient failures surface as errors for the
    /// caller's retry loop.
    async fn complete(&self, prompt: &str) -> Result<String, RagError>;

    async fn health(&self) -> bool;
}

/// Gemini-backed completion client.
pub struct GeminiLlm {
    model: String,
    api_key: String,
    max_output_tokens: u32,
    temperature: f64,
    top_p: f64,
    top_k: u32,
    client: reqwest::Client,
}

impl GeminiLlm {
    pub fn new(config: &LlmConfig) -> Result<Self, RagError> {
        let api_key = std::env::var(LLM_API_KEY_VAR)
            .map_err(|_| RagError::LlmGeneration(format!("{LLM_API_KEY_VAR} not set")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::LlmGeneration(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        )
    }

    fn request_body(&self, prompt: &str, max_output_tokens: u32) -> serde_json::Value {
        serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "topP": self.top_p,
                "topK": self.top_k,
                "maxOutputTokens": max_output_tokens,
            },
        })
    }
}

#[async_trait]
impl Llm for GeminiLlm {
    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        let body = self.request_body(prompt, self.max_output_tokens);

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::LlmGeneration(format!("LLM request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::LlmGeneration(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::LlmGeneration(format!("Invalid LLM response: {e}")))?;
        let text = parse_completion(&json)?;
        debug!(chars = text.len(), model = %self.model, "completion received");
        Ok(text)
    }

    async fn health(&self) -> bool {
        // A completion round-trip is the only meaningful probe. Cap it at
        // one output token and only check the status: a truncated candidate
        // still proves the service is reachable and authenticated.
        let body = self.request_body("Test", 1);
        match self.client.post(self.endpoint()).json(&body).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String, RagError> {
    json.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| RagError::LlmGeneration("Invalid LLM response: no candidate text".to_string()))
}
