//! Parent/child document chunker.
//!
//! Builds a flat, ordered chunk sequence from extracted pages. Each page
//! body (cleaned text plus labelled table markdown) is split on paragraph
//! boundaries into parent chunks, and each parent is split on sentence
//! boundaries into child chunks. Children carry their parent's full text so
//! retrieval ranks on the focused child while generation sees the wider
//! context. Tables are additionally emitted as standalone chunks.
//!
//! Chunks whose trimmed text is 50 characters or shorter are dropped.

use tracing::debug;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkKind, ExtractedDocument};

/// Minimum trimmed length for a chunk to be kept.
const MIN_CHUNK_CHARS: usize = 50;

/// Produce the flat chunk sequence for an extracted document.
pub fn chunk_document(doc: &ExtractedDocument, config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for page in &doc.pages {
        let mut page_body = page.text.clone();
        for table in &page.tables {
            page_body.push_str(&format!(
                "\n\n**Table {}:**\n{}\n",
                table.table_index + 1,
                table.markdown
            ));
        }

        let parents = split_into_parents(&page_body, config.max_parent_chunk_size);
        for (parent_index, parent_text) in parents.iter().enumerate() {
            for (child_index, child_text) in split_into_children(parent_text, config.chunk_size)
                .into_iter()
                .enumerate()
            {
                chunks.push(Chunk {
                    text: child_text,
                    parent_text: parent_text.clone(),
                    page_number: page.page_number,
                    parent_index: parent_index as i64,
                    child_index: child_index as i64,
                    kind: ChunkKind::Text,
                });
            }
        }

        for table in &page.tables {
            chunks.push(Chunk {
                text: table.markdown.clone(),
                parent_text: table.markdown.clone(),
                page_number: page.page_number,
                parent_index: -1,
                child_index: table.table_index as i64,
                kind: ChunkKind::Table,
            });
        }
    }

    chunks.retain(|chunk| chunk.text.trim().len() > MIN_CHUNK_CHARS);
    debug!(chunk_count = chunks.len(), "chunking completed");
    chunks
}

/// Greedily accumulate paragraphs into parent chunks.
///
/// Splits on blank-line boundaries and starts a new parent when adding the
/// next paragraph would exceed `max_size`. A single oversized paragraph is
/// not split further, so a parent may exceed the nominal maximum.
fn split_into_parents(text: &str, max_size: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut parents = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if current.len() + paragraph.len() > max_size && !current.is_empty() {
            parents.push(std::mem::take(&mut current));
            current.push_str(paragraph);
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
    }
    if !current.trim().is_empty() {
        parents.push(current);
    }
    parents
}

/// Greedily accumulate sentences into child chunks of at most `max_size`
/// characters (a single oversized sentence is kept whole).
fn split_into_children(text: &str, max_size: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut children = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        if current.len() + sentence.len() > max_size && !current.is_empty() {
            children.push(std::mem::take(&mut current));
            current.push_str(sentence);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        }
    }
    if !current.trim().is_empty() {
        children.push(current);
    }
    children
}

/// Split text after sentence-ending punctuation (`.`, `!`, `?`) followed by
/// whitespace. The punctuation stays with the preceding sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let mut end = i + 1;
            // consume the whitespace run after the terminator
            let mut j = end;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j > end && j < bytes.len() {
                sentences.push(&text[start..end]);
                start = j;
                i = j;
                continue;
            }
            i = end;
        } else {
            i += 1;
        }
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}
