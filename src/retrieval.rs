//! Embedding + vector search + keyword-boost re-ranking.
//!
//! [`Retriever`] owns the two remote seams ([`Embedder`], [`VectorIndex`])
//! and implements the ingestion-side upsert and the query-side hybrid
//! search. Pure embedding similarity under-weights exact terminology
//! matches (policy clause numbers, defined terms), so semantic scores are
//! multiplied by `1 + 0.1 × matched-query-terms` before the final ranking.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::embedding::{embed_query, Embedder};
use crate::error::RagError;
use crate::index::VectorIndex;
use crate::models::{Chunk, SearchHit, VectorMetadata, VectorRecord};

/// Maximum records per upsert call to the remote index.
const UPSERT_BATCH_SIZE: usize = 100;
/// Metadata truncation limits imposed by the index service.
const METADATA_TEXT_LIMIT: usize = 1000;
const METADATA_PARENT_TEXT_LIMIT: usize = 2000;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// One-vector self-test: embed a probe text and verify the model's
    /// output dimension matches the configured index dimension. Run once at
    /// startup; a mismatch is fatal.
    pub async fn verify_dims(&self) -> Result<(), RagError> {
        let probe = embed_query(self.embedder.as_ref(), "test").await?;
        let expected = self.embedder.dims();
        if probe.len() != expected {
            return Err(RagError::VectorSearch(format!(
                "Model dimension ({}) does not match index dimension ({})",
                probe.len(),
                expected
            )));
        }
        Ok(())
    }

    /// Embed chunk texts and write vector records to the index in batches
    /// of at most 100.
    ///
    /// Record ids are `{document_id}_{i}_{hash8}` where `hash8` is the
    /// first 8 hex chars of the chunk text's SHA-256, so re-upserting
    /// identical content is idempotent.
    pub async fn upsert_chunks(&self, chunks: &[Chunk], document_id: &str) -> Result<(), RagError> {
        if chunks.is_empty() {
            debug!(document_id, "no chunks to upsert");
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::VectorSearch(format!(
                "embedding count mismatch: {} chunks, {} vectors",
                chunks.len(),
                embeddings.len()
            )));
        }

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk, values))| VectorRecord {
                id: vector_id(document_id, i, &chunk.text),
                values,
                metadata: VectorMetadata {
                    document_id: document_id.to_string(),
                    text: truncate_chars(&chunk.text, METADATA_TEXT_LIMIT),
                    page_number: chunk.page_number,
                    chunk_type: chunk.kind,
                    parent_text: truncate_chars(&chunk.parent_text, METADATA_PARENT_TEXT_LIMIT),
                },
            })
            .collect();

        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            self.index.upsert(batch).await?;
        }

        info!(
            document_id,
            chunk_count = chunks.len(),
            "upserted chunks to index"
        );
        Ok(())
    }

    /// Semantic search over one document's vectors, re-ranked with a
    /// lexical keyword boost.
    ///
    /// Queries the index for `2 × top_k` neighbors filtered to
    /// `document_id`, multiplies each score by `1 + 0.1 × matches` (matches
    /// = distinct lower-cased query terms occurring as substrings of the
    /// hit text), re-sorts descending, and returns the top `top_k`.
    pub async fn hybrid_search(
        &self,
        query: &str,
        document_id: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, RagError> {
        debug!(document_id, top_k, "hybrid search");
        let query_vector = embed_query(self.embedder.as_ref(), query).await?;
        let matches = self
            .index
            .query(&query_vector, document_id, top_k * 2)
            .await?;

        let mut hits: Vec<SearchHit> = matches
            .into_iter()
            .map(|m| SearchHit {
                id: m.id,
                score: m.score,
                text: m.metadata.text,
                page_number: m.metadata.page_number,
                chunk_type: m.metadata.chunk_type,
                parent_text: m.metadata.parent_text,
            })
            .collect();

        apply_keyword_boost(&mut hits, query);
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Deterministic record id derived from document, sequence position, and a
/// content-hash prefix.
pub fn vector_id(document_id: &str, sequence_index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("{}_{}_{}", document_id, sequence_index, &hash[..8])
}

/// Multiply each hit's score by `1 + 0.1 × matched-term-count`.
fn apply_keyword_boost(hits: &mut [SearchHit], query: &str) {
    let query_lower = query.to_lowercase();
    let terms: HashSet<&str> = query_lower.split_whitespace().collect();
    for hit in hits.iter_mut() {
        let text_lower = hit.text.to_lowercase();
        let matches = terms.iter().filter(|t| text_lower.contains(**t)).count();
        if matches > 0 {
            hit.score *= 1.0 + matches as f64 * 0.1;
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
