//! Error taxonomy for the retrieval pipeline.
//!
//! Each variant corresponds to a pipeline stage and maps to a distinct HTTP
//! status at the server boundary (see [`crate::server`]):
//!
//! | Variant | Stage | Status |
//! |---------|-------|--------|
//! | [`RagError::DocumentProcessing`] | download / PDF parse | 422 |
//! | [`RagError::VectorSearch`] | embedding / index calls | 503 |
//! | [`RagError::LlmGeneration`] | completion after retry exhaustion | 503 |
//! | [`RagError::Cache`] | cache internals | never surfaced |
//!
//! Cache failures are swallowed at the call site and logged; the variant
//! exists so cache internals have a typed error to return.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("document processing failed: {0}")]
    DocumentProcessing(String),

    #[error("vector search failed: {0}")]
    VectorSearch(String),

    #[error("LLM generation failed: {0}")]
    LlmGeneration(String),

    #[error("cache operation failed: {0}")]
    Cache(String),
}

impl RagError {
    /// Machine-readable type tag used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::DocumentProcessing(_) => "document_processing_error",
            RagError::VectorSearch(_) => "vector_search_error",
            RagError::LlmGeneration(_) => "llm_generation_error",
            RagError::Cache(_) => "cache_error",
        }
    }
}
