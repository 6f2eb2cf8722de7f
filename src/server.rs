//! HTTP API for document question answering.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/run` | Ingest a PDF (by URL or known id) and answer questions |
//! | `GET`  | `/health` | Liveness plus per-dependency health booleans |
//! | `GET`  | `/metrics` | Prometheus text-format counters |
//!
//! `POST /run` requires a bearer token and accepts exactly one document
//! source: a `documents` PDF URL (ingested on demand, memoized by content
//! of the URL) or a `document_id` for content already in the index.
//! Questions are answered concurrently; a failure on one question degrades
//! that answer to a canned string instead of failing the batch.
//!
//! # Error contract
//!
//! Error responses carry a JSON body:
//!
//! ```json
//! { "error": "Validation error", "detail": "Questions list cannot be empty", "type": "validation_error" }
//! ```
//!
//! Statuses: 401 authentication, 400 validation, 422 document processing,
//! 503 embedding/index/LLM outage, 500 otherwise.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::answer::{AnswerGenerator, RetryPolicy};
use crate::cache::TtlCache;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::RagError;
use crate::index::{PineconeIndex, VectorIndex};
use crate::ingest::{DocumentPipeline, ProcessedDocument};
use crate::llm::{GeminiLlm, Llm};
use crate::metrics::Metrics;
use crate::retrieval::Retriever;

const MAX_QUESTIONS: usize = 50;

/// Canned per-question fallbacks. A question never fails the batch; it
/// degrades to one of these.
const NO_HITS_ANSWER: &str =
    "No relevant information found in the document to answer this question.";
const PIPELINE_ERROR_ANSWER: &str =
    "An issue occurred while retrieving information or generating an answer.";
const UNEXPECTED_ERROR_ANSWER: &str = "An unexpected error occurred.";
const BLANK_ANSWER: &str = "Information not found in the document.";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    cache: Arc<TtlCache>,
    pipeline: Arc<DocumentPipeline>,
    retriever: Arc<Retriever>,
    generator: Arc<AnswerGenerator>,
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn Llm>,
    metrics: Arc<Metrics>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        cache: Arc<TtlCache>,
        pipeline: Arc<DocumentPipeline>,
        retriever: Arc<Retriever>,
        generator: Arc<AnswerGenerator>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn Llm>,
    ) -> Self {
        Self {
            config,
            cache,
            pipeline,
            retriever,
            generator,
            index,
            llm,
            metrics: Arc::new(Metrics::new()),
        }
    }
}

/// Starts the HTTP server with production collaborators.
///
/// Fails fast when required credentials are missing or when the embedding
/// model's dimensionality does not match the configured index dimension.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    if config.auth_token().is_none() {
        anyhow::bail!("No auth token configured: set [server].auth_token or RAGSERVE_AUTH_TOKEN");
    }

    let cache = Arc::new(TtlCache::new(config.cache.max_entries));
    let pipeline = Arc::new(DocumentPipeline::new(
        cache.clone(),
        config.chunking.clone(),
        &config.cache,
    )?);

    let embedder: Arc<dyn crate::embedding::Embedder> =
        Arc::from(create_embedder(&config.embedding)?);
    let index: Arc<dyn VectorIndex> = Arc::new(PineconeIndex::new(&config.index)?);
    let retriever = Arc::new(Retriever::new(embedder, index.clone()));
    retriever.verify_dims().await?;

    let llm: Arc<dyn Llm> = Arc::new(GeminiLlm::new(&config.llm)?);
    let generator = Arc::new(AnswerGenerator::new(
        llm.clone(),
        RetryPolicy::from_config(&config.llm),
    ));

    let state = AppState::new(config, cache, pipeline, retriever, generator, index, llm);
    let app = build_router(state);

    info!(bind = %bind_addr, "server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/run", post(handle_run))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error body: a short human label, the specific detail, and a
/// machine-readable type tag.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    detail: String,
    #[serde(rename = "type")]
    kind: String,
}

struct AppError {
    status: StatusCode,
    error: String,
    detail: String,
    kind: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            detail: self.detail,
            kind: self.kind,
        };
        (self.status, Json(body)).into_response()
    }
}

fn authentication_error(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        error: "Authentication failed".to_string(),
        detail: detail.into(),
        kind: "authentication_error".to_string(),
    }
}

fn validation_error(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        error: "Validation error".to_string(),
        detail: detail.into(),
        kind: "validation_error".to_string(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match err {
            RagError::DocumentProcessing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RagError::VectorSearch(_) | RagError::LlmGeneration(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RagError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let error = match err {
            RagError::DocumentProcessing(_) => "Document processing failed",
            RagError::VectorSearch(_) => "Vector search failed",
            RagError::LlmGeneration(_) => "Answer generation failed",
            RagError::Cache(_) => "Internal error",
        };
        AppError {
            status,
            error: error.to_string(),
            detail: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

// ============ POST /run ============

#[derive(Deserialize)]
struct RunRequest {
    /// PDF URL to ingest. Mutually exclusive with `document_id`.
    #[serde(default)]
    documents: Option<String>,
    /// Identifier of a document already present in the index.
    #[serde(default)]
    document_id: Option<String>,
    questions: Vec<String>,
}

#[derive(Serialize)]
struct RunResponse {
    answers: Vec<String>,
}

async fn handle_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunResponse>, AppError> {
    check_auth(&state, &headers)?;
    validate_request(&request)?;

    state.metrics.record_request();
    state.metrics.record_questions(request.questions.len() as u64);

    let document_id = match (&request.documents, &request.document_id) {
        (Some(url), None) => {
            let processed = state.pipeline.process_url(url).await?;
            commit_document(&state.pipeline, &state.retriever, &processed).await?;
            processed.document_id
        }
        (None, Some(id)) => id.clone(),
        // unreachable after validation
        _ => return Err(validation_error("Either a \"documents\" URL or a \"document_id\" must be provided.")),
    };

    info!(
        document_id,
        question_count = request.questions.len(),
        "answering questions"
    );

    let tasks = request
        .questions
        .iter()
        .map(|q| answer_question(&state, &document_id, q));
    let answers: Vec<String> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|answer| {
            let trimmed = answer.trim();
            if trimmed.is_empty() {
                BLANK_ANSWER.to_string()
            } else {
                trimmed.to_string()
            }
        })
        .collect();

    Ok(Json(RunResponse { answers }))
}

/// Make a freshly processed document queryable: upsert its vectors, then
/// persist the chunk cache entry. Cached documents are already committed.
///
/// The chunk cache is written only after the upsert succeeds; a cached
/// entry with no vectors behind it would turn every retry into a cache
/// hit that skips the upsert and answers nothing until the TTL expires.
async fn commit_document(
    pipeline: &DocumentPipeline,
    retriever: &Retriever,
    processed: &ProcessedDocument,
) -> Result<(), RagError> {
    if processed.cached {
        return Ok(());
    }
    retriever
        .upsert_chunks(&processed.chunks, &processed.document_id)
        .await?;
    pipeline.store_chunks(&processed.document_id, &processed.chunks);
    Ok(())
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let expected = state
        .config
        .auth_token()
        .ok_or_else(|| authentication_error("No auth token configured"))?;
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| authentication_error("Missing bearer token"))?;
    if provided != expected {
        return Err(authentication_error("Invalid authentication token"));
    }
    Ok(())
}

fn validate_request(request: &RunRequest) -> Result<(), AppError> {
    match (&request.documents, &request.document_id) {
        (None, None) => {
            return Err(validation_error(
                "Either a \"documents\" URL or a \"document_id\" must be provided.",
            ))
        }
        (Some(_), Some(_)) => {
            return Err(validation_error(
                "Provide either a \"documents\" URL or a \"document_id\", but not both.",
            ))
        }
        _ => {}
    }
    if let Some(url) = &request.documents {
        if !url.to_lowercase().ends_with(".pdf") {
            return Err(validation_error("Only PDF document URLs are supported"));
        }
    }
    if request.questions.is_empty() {
        return Err(validation_error("Questions list cannot be empty"));
    }
    if request.questions.len() > MAX_QUESTIONS {
        return Err(validation_error("Too many questions (max 50)"));
    }
    Ok(())
}

/// Answer one question, memoized per document. Infallible by contract:
/// pipeline failures degrade to canned answer strings.
async fn answer_question(state: &AppState, document_id: &str, question: &str) -> String {
    let cache_key = answer_cache_key(document_id, question);
    if let Some(cached) = state.cache.get(&cache_key) {
        return cached;
    }

    match try_answer(state, document_id, question).await {
        Ok(answer) => answer,
        Err(e @ (RagError::VectorSearch(_) | RagError::LlmGeneration(_) | RagError::DocumentProcessing(_))) => {
            state.metrics.record_question_error();
            error!(question, error = %e, "question pipeline failed");
            PIPELINE_ERROR_ANSWER.to_string()
        }
        Err(e) => {
            state.metrics.record_question_error();
            error!(question, error = %e, "unexpected question failure");
            UNEXPECTED_ERROR_ANSWER.to_string()
        }
    }
}

async fn try_answer(
    state: &AppState,
    document_id: &str,
    question: &str,
) -> Result<String, RagError> {
    let hits = state
        .retriever
        .hybrid_search(question, document_id, state.config.retrieval.top_k_rerank)
        .await?;
    if hits.is_empty() {
        warn!(document_id, question, "no relevant chunks found");
        return Ok(NO_HITS_ANSWER.to_string());
    }

    let answer = state.generator.generate(question, &hits).await?;
    state.cache.set(
        &answer_cache_key(document_id, question),
        answer.clone(),
        std::time::Duration::from_secs(state.config.cache.ttl_secs),
    );
    Ok(answer)
}

fn answer_cache_key(document_id: &str, question: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(question.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("answer:{document_id}:{}", &hash[..16])
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    services: ServiceHealth,
}

#[derive(Serialize)]
struct ServiceHealth {
    cache: bool,
    vector: bool,
    llm: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (vector, llm) = tokio::join!(state.index.health(), state.llm.health());
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: ServiceHealth {
            cache: true,
            vector,
            llm,
        },
    })
}

// ============ GET /metrics ============

async fn handle_metrics(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, ChunkingConfig};
    use crate::embedding::Embedder;
    use crate::ingest::chunk_cache_key;
    use crate::models::{Chunk, ChunkKind, IndexMatch, VectorRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts.iter().map(|_| vec![0.0f32; 3]).collect())
        }
    }

    /// Fails the first `fail_first` upserts, then succeeds.
    struct FlakyIndex {
        fail_first: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        async fn upsert(&self, _records: &[VectorRecord]) -> Result<(), RagError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(RagError::VectorSearch("index unavailable".to_string()))
            } else {
                Ok(())
            }
        }
        async fn query(
            &self,
            _vector: &[f32],
            _document_id: &str,
            _top_k: usize,
        ) -> Result<Vec<IndexMatch>, RagError> {
            Ok(Vec::new())
        }
        async fn health(&self) -> bool {
            true
        }
    }

    fn fresh_document(document_id: &str) -> ProcessedDocument {
        ProcessedDocument {
            document_id: document_id.to_string(),
            chunks: vec![Chunk {
                text: "a chunk of policy text comfortably over the minimum length".to_string(),
                parent_text: "parent".to_string(),
                page_number: 1,
                parent_index: 0,
                child_index: 0,
                kind: ChunkKind::Text,
            }],
            cached: false,
        }
    }

    #[tokio::test]
    async fn failed_upsert_leaves_no_chunk_cache_entry() {
        let cache = Arc::new(TtlCache::new(10));
        let pipeline =
            DocumentPipeline::new(cache.clone(), ChunkingConfig::default(), &CacheConfig::default())
                .unwrap();
        let retriever = Retriever::new(
            Arc::new(StubEmbedder),
            Arc::new(FlakyIndex {
                fail_first: 1,
                calls: AtomicU32::new(0),
            }),
        );
        let processed = fresh_document("doc");

        // first attempt: index is down, nothing may be cached
        let err = commit_document(&pipeline, &retriever, &processed)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::VectorSearch(_)));
        assert!(cache.get(&chunk_cache_key("doc")).is_none());

        // retry reaches the index again and only then persists the chunks
        commit_document(&pipeline, &retriever, &processed)
            .await
            .unwrap();
        assert!(cache.get(&chunk_cache_key("doc")).is_some());
    }

    #[tokio::test]
    async fn cached_document_is_not_reupserted() {
        let cache = Arc::new(TtlCache::new(10));
        let pipeline =
            DocumentPipeline::new(cache, ChunkingConfig::default(), &CacheConfig::default())
                .unwrap();
        let index = Arc::new(FlakyIndex {
            fail_first: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let retriever = Retriever::new(Arc::new(StubEmbedder), index.clone());

        let mut processed = fresh_document("doc");
        processed.cached = true;
        commit_document(&pipeline, &retriever, &processed)
            .await
            .unwrap();
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn answer_cache_key_distinguishes_questions_and_documents() {
        let a = answer_cache_key("doc1", "What is the grace period?");
        let b = answer_cache_key("doc1", "What is the waiting period?");
        let c = answer_cache_key("doc2", "What is the grace period?");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("answer:doc1:"));
    }

    #[test]
    fn url_validation_is_case_insensitive() {
        let ok = RunRequest {
            documents: Some("https://example.com/Policy.PDF".to_string()),
            document_id: None,
            questions: vec!["q".to_string()],
        };
        assert!(validate_request(&ok).is_ok());

        let bad = RunRequest {
            documents: Some("https://example.com/policy.docx".to_string()),
            document_id: None,
            questions: vec!["q".to_string()],
        };
        assert!(validate_request(&bad).is_err());
    }

    #[test]
    fn exactly_one_document_source_is_required() {
        let neither = RunRequest {
            documents: None,
            document_id: None,
            questions: vec!["q".to_string()],
        };
        assert!(validate_request(&neither).is_err());

        let both = RunRequest {
            documents: Some("https://example.com/a.pdf".to_string()),
            document_id: Some("doc".to_string()),
            questions: vec!["q".to_string()],
        };
        assert!(validate_request(&both).is_err());

        let id_only = RunRequest {
            documents: None,
            document_id: Some("doc".to_string()),
            questions: vec!["q".to_string()],
        };
        assert!(validate_request(&id_only).is_ok());
    }

    #[test]
    fn question_count_bounds() {
        let empty = RunRequest {
            documents: None,
            document_id: Some("doc".to_string()),
            questions: Vec::new(),
        };
        assert!(validate_request(&empty).is_err());

        let too_many = RunRequest {
            documents: None,
            document_id: Some("doc".to_string()),
            questions: vec!["q".to_string(); 51],
        };
        assert!(validate_request(&too_many).is_err());

        let at_limit = RunRequest {
            documents: None,
            document_id: Some("doc".to_string()),
            questions: vec!["q".to_string(); 50],
        };
        assert!(validate_request(&at_limit).is_ok());
    }
}
