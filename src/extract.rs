//! Layout-aware PDF extraction.
//!
//! Converts raw PDF bytes into page-structured text plus tables. Text is
//! cleaned (whitespace collapse, footer stripping, typographic-character
//! normalization) and table-like line runs are detected and rendered to
//! markdown. Extraction is all-or-nothing: if the underlying parser fails,
//! the whole document fails with a [`RagError::DocumentProcessing`].

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::RagError;
use crate::models::{DocumentMetadata, DocumentTable, ExtractedDocument, Page, Table};

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Matches `Page <n>...` footers up to end-of-line, case-insensitively.
static PAGE_FOOTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)Page \d+.*?$").expect("static regex"));

/// Splits a potential table row into cells: tab or a run of 2+ spaces.
static CELL_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\t| {2,}").expect("static regex"));

/// Extract page-structured content from PDF bytes.
pub fn extract_pdf(pdf_bytes: &[u8]) -> Result<ExtractedDocument, RagError> {
    let raw_pages = pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
        .map_err(|e| RagError::DocumentProcessing(format!("PDF parse failed: {e}")))?;

    let mut pages = Vec::with_capacity(raw_pages.len());
    let mut all_tables = Vec::new();

    for (i, raw_text) in raw_pages.iter().enumerate() {
        let page_number = i + 1;
        let mut tables = Vec::new();
        for (table_index, raw) in detect_tables(raw_text).into_iter().enumerate() {
            let markdown = table_to_markdown(&raw);
            all_tables.push(DocumentTable {
                page: page_number,
                index: table_index,
                markdown: markdown.clone(),
            });
            tables.push(Table {
                table_index,
                markdown,
                raw,
            });
        }
        pages.push(Page {
            page_number,
            text: clean_text(raw_text),
            tables,
        });
    }

    debug!(
        page_count = pages.len(),
        table_count = all_tables.len(),
        "PDF content extraction completed"
    );

    Ok(ExtractedDocument {
        metadata: DocumentMetadata {
            page_count: pages.len(),
            title: None,
        },
        pages,
        tables: all_tables,
    })
}

/// Clean and normalize extracted page text.
///
/// Collapses whitespace runs to a single space, strips `Page N...` footer
/// lines, maps non-breaking spaces and typographic quotes to their ASCII
/// equivalents, and trims.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = PAGE_FOOTER.replace_all(text, "");
    let text = WHITESPACE_RUNS.replace_all(&text, " ");
    text.replace('\u{00a0}', " ")
        .replace('\u{2019}', "'")
        .replace('\u{201c}', "\"")
        .replace('\u{201d}', "\"")
        .trim()
        .to_string()
}

/// Render rows of cells as a markdown table.
///
/// The first row becomes the header, followed by a dash separator; data
/// rows are right-padded with empty cells (or truncated) to the header
/// width. Tables with fewer than two rows render as an empty string.
pub fn table_to_markdown(rows: &[Vec<String>]) -> String {
    if rows.len() < 2 {
        return String::new();
    }
    let header = &rows[0];
    let separator: Vec<String> = header
        .iter()
        .map(|cell| "-".repeat(cell.len().max(3)))
        .collect();

    let mut lines = vec![
        format!("| {} |", header.join(" | ")),
        format!("| {} |", separator.join(" | ")),
    ];
    for row in &rows[1..] {
        let mut cells = row.clone();
        while cells.len() < header.len() {
            cells.push(String::new());
        }
        cells.truncate(header.len());
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    lines.join("\n")
}

/// Detect table-like regions in raw page text.
///
/// A line counts as a table row when splitting on tabs or 2+ space runs
/// yields at least two non-empty cells. Consecutive row lines form a table;
/// a table is kept only with a header plus at least one data row.
fn detect_tables(page_text: &str) -> Vec<Vec<Vec<String>>> {
    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in page_text.lines() {
        match split_row(line) {
            Some(cells) => current.push(cells),
            None => {
                if current.len() > 1 {
                    tables.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
        }
    }
    if current.len() > 1 {
        tables.push(current);
    }
    tables
}

fn split_row(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cells: Vec<String> = CELL_SEPARATOR
        .split(trimmed)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if cells.len() >= 2 {
        Some(cells)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(table: &[&[&str]]) -> Vec<Vec<String>> {
        table
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn clean_collapses_whitespace_and_trims() {
        assert_eq!(clean_text("  hello   world\n\nagain  "), "hello world again");
    }

    #[test]
    fn clean_strips_page_footers() {
        let cleaned = clean_text("Some clause text.\npage 12 of 40\nMore text.");
        assert!(!cleaned.to_lowercase().contains("page 12"));
        assert!(cleaned.contains("Some clause text."));
        assert!(cleaned.contains("More text."));
    }

    #[test]
    fn clean_normalizes_typographic_characters() {
        assert_eq!(
            clean_text("it\u{2019}s \u{201c}quoted\u{201d}\u{00a0}text"),
            "it's \"quoted\" text"
        );
    }

    #[test]
    fn clean_empty_is_empty() {
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn markdown_has_header_separator_and_padded_rows() {
        let table = rows(&[
            &["Plan", "Premium", "Cover"],
            &["A", "100"],
            &["B", "200", "5L", "extra"],
        ]);
        let md = table_to_markdown(&table);
        let lines: Vec<&str> = md.lines().collect();
        // header + separator + N data rows
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "| Plan | Premium | Cover |");
        assert_eq!(lines[1], "| ---- | ------- | ----- |");
        // short row right-padded to header width
        assert_eq!(lines[2], "| A | 100 |  |");
        // long row truncated to header width
        assert_eq!(lines[3], "| B | 200 | 5L |");
    }

    #[test]
    fn markdown_separator_minimum_width() {
        let table = rows(&[&["A", "B"], &["1", "2"]]);
        let md = table_to_markdown(&table);
        assert_eq!(md.lines().nth(1).unwrap(), "| --- | --- |");
    }

    #[test]
    fn markdown_single_row_is_empty() {
        let table = rows(&[&["only", "header"]]);
        assert_eq!(table_to_markdown(&table), "");
    }

    #[test]
    fn detects_consecutive_row_lines_as_table() {
        let text = "Intro paragraph.\nPlan  Premium  Cover\nA  100  2L\nB  200  5L\nOutro.";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].len(), 3);
        assert_eq!(tables[0][0], vec!["Plan", "Premium", "Cover"]);
        assert_eq!(tables[0][2], vec!["B", "200", "5L"]);
    }

    #[test]
    fn lone_row_line_is_not_a_table() {
        let text = "Some text.\nName  Value\nMore prose without columns.";
        assert!(detect_tables(text).is_empty());
    }

    #[test]
    fn tab_separated_rows_detected() {
        let text = "Col1\tCol2\nv1\tv2";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0][1], vec!["v1", "v2"]);
    }

    #[test]
    fn invalid_pdf_is_a_document_processing_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, RagError::DocumentProcessing(_)));
    }
}
