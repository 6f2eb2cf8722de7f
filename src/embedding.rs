//! Embedding provider abstraction and remote implementations.
//!
//! Defines the [`Embedder`] trait behind which the rest of the pipeline
//! sees batch text encoding, plus two HTTP-backed providers:
//! - **OpenAI** — `POST /v1/embeddings`, authenticated via `OPENAI_API_KEY`.
//! - **Ollama** — `POST /api/embed` against a local or remote instance.
//!
//! Both retry transient failures with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Embedding failures surface as [`RagError::VectorSearch`], matching the
//! error taxonomy's treatment of embedding as part of vector retrieval.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::RagError;

/// Batch text-encoding capability with a fixed output dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"nomic-embed-text-v1.5"`).
    fn model_name(&self) -> &str;
    /// Declared embedding dimensionality; verified against the index at startup.
    fn dims(&self) -> usize;
    /// Encode a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, RagError> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| RagError::VectorSearch("Empty embedding response".to_string()))
}

/// Create the configured embedding provider.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, RagError> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        other => Err(RagError::VectorSearch(format!(
            "Unknown embedding provider: {other}"
        ))),
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client, RagError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::VectorSearch(format!("HTTP client build failed: {e}")))
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

// ============ OpenAI provider ============

/// Embedding provider backed by the OpenAI embeddings API.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RagError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| RagError::VectorSearch("OPENAI_API_KEY not set".to_string()))?;
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            api_key,
            client: build_client(config.timeout_secs)?,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            RagError::VectorSearch(format!("Invalid embeddings response: {e}"))
                        })?;
                        return parse_openai_response(&json);
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("OpenAI API error {status}: {body_text}"));
                        continue;
                    }
                    return Err(RagError::VectorSearch(format!(
                        "OpenAI API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(RagError::VectorSearch(
            last_err.unwrap_or_else(|| "Embedding failed after retries".to_string()),
        ))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, RagError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::VectorSearch("Invalid response: missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                RagError::VectorSearch("Invalid response: missing embedding".to_string())
            })?;
        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(embeddings)
}

// ============ Ollama provider ============

/// Embedding provider backed by an Ollama instance's `/api/embed` endpoint.
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RagError> {
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs)?,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/embed", self.url))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            RagError::VectorSearch(format!("Invalid embeddings response: {e}"))
                        })?;
                        return parse_ollama_response(&json);
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("Ollama API error {status}: {body_text}"));
                        continue;
                    }
                    return Err(RagError::VectorSearch(format!(
                        "Ollama API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(format!(
                        "Ollama connection error (is Ollama running at {}?): {e}",
                        self.url
                    ));
                    continue;
                }
            }
        }

        Err(RagError::VectorSearch(
            last_err.unwrap_or_else(|| "Ollama embedding failed after retries".to_string()),
        ))
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, RagError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::VectorSearch("Invalid response: missing embeddings array".to_string())
        })?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| {
                RagError::VectorSearch("Invalid response: embedding is not an array".to_string())
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(6), Duration::from_secs(32));
        assert_eq!(backoff_delay(10), Duration::from_secs(32));
    }

    #[test]
    fn parses_openai_shape() {
        let json = serde_json::json!({
            "data": [
                {"embedding": [0.1, 0.2]},
                {"embedding": [0.3, 0.4]}
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[1], vec![0.3, 0.4]);
    }

    #[test]
    fn parses_ollama_shape() {
        let json = serde_json::json!({ "embeddings": [[1.0, -2.5], [0.0, 3.0]] });
        let vecs = parse_ollama_response(&json).unwrap();
        assert_eq!(vecs[0], vec![1.0, -2.5]);
    }

    #[test]
    fn missing_data_array_is_an_error() {
        let err = parse_openai_response(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, RagError::VectorSearch(_)));
    }
}
