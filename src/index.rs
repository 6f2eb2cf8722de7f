//! Remote vector index client.
//!
//! The [`VectorIndex`] trait is the seam between retrieval and the managed
//! index service; [`PineconeIndex`] is the production implementation,
//! speaking the Pinecone data-plane HTTP API (`/vectors/upsert`, `/query`,
//! `/describe_index_stats`). Consistency of the index is delegated to the
//! remote service.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::{IndexConfig, INDEX_API_KEY_VAR};
use crate::error::RagError;
use crate::models::{IndexMatch, VectorRecord};

/// Upsert/query capability of the remote vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Write a batch of records. Callers keep batches at or under 100.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), RagError>;

    /// Nearest-neighbor query restricted to one document's vectors.
    async fn query(
        &self,
        vector: &[f32],
        document_id: &str,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, RagError>;

    async fn health(&self) -> bool;
}

/// Pinecone-backed index client.
pub struct PineconeIndex {
    host: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}

impl PineconeIndex {
    pub fn new(config: &IndexConfig) -> Result<Self, RagError> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| RagError::VectorSearch("index.host is not configured".to_string()))?;
        let api_key = std::env::var(INDEX_API_KEY_VAR)
            .map_err(|_| RagError::VectorSearch(format!("{INDEX_API_KEY_VAR} not set")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::VectorSearch(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, RagError> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| RagError::VectorSearch(format!("index request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::VectorSearch(format!(
                "index error {status}: {body_text}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| RagError::VectorSearch(format!("invalid index response: {e}")))
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), RagError> {
        if records.is_empty() {
            return Ok(());
        }
        let body = serde_json::json!({ "vectors": records });
        self.post("/vectors/upsert", &body).await?;
        debug!(count = records.len(), "upserted vector batch");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        document_id: &str,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, RagError> {
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "filter": { "document_id": { "$eq": document_id } },
            "includeMetadata": true,
        });
        let json = self.post("/query", &body).await?;
        let parsed: QueryResponse = serde_json::from_value(json)
            .map_err(|e| RagError::VectorSearch(format!("invalid query response: {e}")))?;
        Ok(parsed.matches)
    }

    async fn health(&self) -> bool {
        self.post("/describe_index_stats", &serde_json::json!({}))
            .await
            .is_ok()
    }
}
