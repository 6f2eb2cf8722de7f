//! Document ingestion pipeline: download, extract, chunk, cache.
//!
//! A document is identified by a hash of its source URL (or an explicit id
//! for local files), and its chunk sequence is memoized in the shared
//! cache under `doc_chunks:{document_id}`. A cache hit skips download and
//! extraction entirely, and callers use the `cached` flag to skip
//! re-upserting vectors that are already in the index.
//!
//! The pipeline only reads the chunk cache; persisting is the caller's
//! job via [`DocumentPipeline::store_chunks`], after the vectors have
//! been committed to the index. A cached entry asserts "these chunks are
//! queryable", so it must never be written ahead of a successful upsert.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::chunk::chunk_document;
use crate::config::{CacheConfig, ChunkingConfig};
use crate::error::RagError;
use crate::extract::extract_pdf;
use crate::models::Chunk;

/// Hex length of derived document ids.
const DOCUMENT_ID_LEN: usize = 32;

/// A processed document: its derived id, chunk sequence, and whether the
/// chunks came from cache.
#[derive(Debug)]
pub struct ProcessedDocument {
    pub document_id: String,
    pub chunks: Vec<Chunk>,
    pub cached: bool,
}

pub struct DocumentPipeline {
    http: reqwest::Client,
    cache: Arc<TtlCache>,
    chunking: ChunkingConfig,
    document_ttl: Duration,
}

impl DocumentPipeline {
    pub fn new(
        cache: Arc<TtlCache>,
        chunking: ChunkingConfig,
        cache_config: &CacheConfig,
    ) -> Result<Self, RagError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagError::DocumentProcessing(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            cache,
            chunking,
            document_ttl: Duration::from_secs(cache_config.document_ttl_secs),
        })
    }

    /// Download, extract, and chunk the PDF at `url`, serving from the
    /// chunk cache when possible.
    pub async fn process_url(&self, url: &str) -> Result<ProcessedDocument, RagError> {
        let document_id = document_id_for_url(url);
        let cache_key = chunk_cache_key(&document_id);

        if let Some(cached) = self.cache.get(&cache_key) {
            match serde_json::from_str::<Vec<Chunk>>(&cached) {
                Ok(chunks) => {
                    debug!(document_id, chunk_count = chunks.len(), "chunk cache hit");
                    return Ok(ProcessedDocument {
                        document_id,
                        chunks,
                        cached: true,
                    });
                }
                Err(e) => {
                    // stale or corrupt entry, reprocess from source
                    warn!(document_id, error = %e, "discarding unreadable cached chunks");
                    self.cache.delete(&cache_key);
                }
            }
        }

        let bytes = self.download(url).await?;
        let chunks = self.extract_and_chunk(bytes).await?;

        info!(document_id, chunk_count = chunks.len(), "document processed");
        Ok(ProcessedDocument {
            document_id,
            chunks,
            cached: false,
        })
    }

    /// Persist a document's chunk sequence so later requests for the same
    /// document skip download and extraction. Call only once the chunks'
    /// vectors are in the index: readers treat a cached entry as proof the
    /// document is queryable.
    pub fn store_chunks(&self, document_id: &str, chunks: &[Chunk]) {
        match serde_json::to_string(chunks) {
            Ok(serialized) => self.cache.set(
                &chunk_cache_key(document_id),
                serialized,
                self.document_ttl,
            ),
            Err(e) => warn!(document_id, error = %e, "failed to serialize chunks for cache"),
        }
    }

    /// Extract and chunk a local PDF file under an explicit document id.
    pub async fn process_file(
        &self,
        path: &std::path::Path,
        document_id: &str,
    ) -> Result<ProcessedDocument, RagError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            RagError::DocumentProcessing(format!("Failed to read {}: {e}", path.display()))
        })?;
        if bytes.is_empty() {
            return Err(RagError::DocumentProcessing(
                "Document file is empty".to_string(),
            ));
        }
        let chunks = self.extract_and_chunk(bytes).await?;
        info!(
            document_id,
            chunk_count = chunks.len(),
            path = %path.display(),
            "file processed"
        );
        Ok(ProcessedDocument {
            document_id: document_id.to_string(),
            chunks,
            cached: false,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RagError> {
        debug!(url, "downloading document");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RagError::DocumentProcessing(format!("Download failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::DocumentProcessing(format!(
                "Download failed with status {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RagError::DocumentProcessing(format!("Download failed: {e}")))?;
        if bytes.is_empty() {
            return Err(RagError::DocumentProcessing(
                "Downloaded document is empty".to_string(),
            ));
        }
        debug!(size = bytes.len(), "document downloaded");
        Ok(bytes.to_vec())
    }

    /// PDF parsing is CPU-bound, so it runs on the blocking pool.
    async fn extract_and_chunk(&self, bytes: Vec<u8>) -> Result<Vec<Chunk>, RagError> {
        let chunking = self.chunking.clone();
        tokio::task::spawn_blocking(move || {
            let doc = extract_pdf(&bytes)?;
            Ok(chunk_document(&doc, &chunking))
        })
        .await
        .map_err(|e| RagError::DocumentProcessing(format!("Extraction task failed: {e}")))?
    }
}

/// CLI entry point: extract, chunk, embed, and upsert a local PDF so it
/// can be queried by `document_id` without a URL.
pub async fn run_ingest(
    config: &crate::config::Config,
    path: &std::path::Path,
    document_id: Option<String>,
) -> anyhow::Result<()> {
    let document_id = document_id.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    });

    let cache = Arc::new(TtlCache::new(config.cache.max_entries));
    let pipeline = DocumentPipeline::new(cache, config.chunking.clone(), &config.cache)?;
    let processed = pipeline.process_file(path, &document_id).await?;

    let embedder: Arc<dyn crate::embedding::Embedder> =
        Arc::from(crate::embedding::create_embedder(&config.embedding)?);
    let index: Arc<dyn crate::index::VectorIndex> =
        Arc::new(crate::index::PineconeIndex::new(&config.index)?);
    let retriever = crate::retrieval::Retriever::new(embedder, index);
    retriever.verify_dims().await?;
    retriever
        .upsert_chunks(&processed.chunks, &processed.document_id)
        .await?;

    println!(
        "Ingested {} as document_id '{}' ({} chunks).",
        path.display(),
        processed.document_id,
        processed.chunks.len()
    );
    Ok(())
}

/// Derive a stable document id from a source URL.
pub fn document_id_for_url(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..DOCUMENT_ID_LEN].to_string()
}

/// Cache key for a document's chunk sequence.
pub fn chunk_cache_key(document_id: &str) -> String {
    format!("doc_chunks:{document_id}")
}
