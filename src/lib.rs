//! # ragserve
//!
//! A retrieval-augmented question answering service for PDF documents.
//!
//! ragserve downloads a PDF, extracts per-page text and tables, splits it
//! into parent/child chunks, embeds the chunks, and stores the vectors in
//! a managed index. Questions are answered by hybrid search (semantic
//! similarity re-ranked with a keyword boost) over one document's vectors,
//! followed by a grounded completion from a hosted LLM.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────────┐
//! │ PDF URL  │──▶│   Pipeline     │──▶│ Vector index   │
//! │ or file  │   │ Extract+Chunk │   │ (embeddings)  │
//! └──────────┘   └───────────────┘   └──────┬────────┘
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                ┌──────────┐        ┌──────────┐
//!                │  Hybrid  │───────▶│   LLM    │
//!                │  search  │        │  answer  │
//!                └──────────┘        └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text and table extraction |
//! | [`chunk`] | Parent/child chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Remote vector index client |
//! | [`retrieval`] | Upsert and hybrid search |
//! | [`answer`] | Prompting, retry, post-processing |
//! | [`ingest`] | Download/extract/chunk pipeline |
//! | [`cache`] | Bounded LRU cache with TTL |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod retrieval;
pub mod server;
