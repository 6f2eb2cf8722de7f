//! Core data types that flow through the extraction and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Structured output of PDF extraction: per-page text plus detected tables.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub pages: Vec<Page>,
    pub tables: Vec<DocumentTable>,
    pub metadata: DocumentMetadata,
}

/// A single page: cleaned text and the tables found on it.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based page number.
    pub page_number: usize,
    pub text: String,
    pub tables: Vec<Table>,
}

/// A table detected on a page, both as raw cells and rendered markdown.
#[derive(Debug, Clone)]
pub struct Table {
    /// 0-based index of the table within its page.
    pub table_index: usize,
    pub markdown: String,
    pub raw: Vec<Vec<String>>,
}

/// Document-level view of a table (page + index + markdown).
#[derive(Debug, Clone)]
pub struct DocumentTable {
    pub page: usize,
    pub index: usize,
    pub markdown: String,
}

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub page_count: usize,
    pub title: Option<String>,
}

/// Whether a chunk carries running text or a rendered table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Text,
    Table,
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkKind::Text => write!(f, "text"),
            ChunkKind::Table => write!(f, "table"),
        }
    }
}

/// A unit of document text prepared for embedding and retrieval.
///
/// Child chunks carry their parent's full text so retrieval can rank on the
/// focused child while generation receives the wider parent context. Table
/// chunks set `parent_index` to `-1` and duplicate the markdown into both
/// text fields.
///
/// Serializes to JSON for the document-chunk cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub parent_text: String,
    pub page_number: usize,
    /// Index of the parent chunk on its page; `-1` for table chunks.
    pub parent_index: i64,
    /// Index of this chunk within its parent (or table index for tables).
    pub child_index: i64,
    #[serde(rename = "type")]
    pub kind: ChunkKind,
}

/// A vector plus metadata as written to the remote index.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Metadata stored alongside each vector. Text fields are truncated before
/// upsert (`text` to 1000 chars, `parent_text` to 2000) to stay within the
/// index's metadata limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub document_id: String,
    pub text: String,
    pub page_number: usize,
    pub chunk_type: ChunkKind,
    pub parent_text: String,
}

/// A raw nearest-neighbor match returned by the index.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    pub score: f64,
    pub metadata: VectorMetadata,
}

/// A retrieval result after keyword boosting, handed to answer generation.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub text: String,
    pub page_number: usize,
    pub chunk_type: ChunkKind,
    pub parent_text: String,
}
