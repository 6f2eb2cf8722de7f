use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable holding the vector index API key.
pub const INDEX_API_KEY_VAR: &str = "PINECONE_API_KEY";
/// Environment variable holding the LLM API key.
pub const LLM_API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Environment variable holding the ingress bearer token.
pub const AUTH_TOKEN_VAR: &str = "RAGSERVE_AUTH_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token for `POST /run`. Overridden by `RAGSERVE_AUTH_TOKEN`
    /// when set; must be non-empty by the time the server starts.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_token: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum size of a child chunk in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Maximum size of a parent chunk in characters.
    #[serde(default = "default_max_parent_chunk_size")]
    pub max_parent_chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    #[allow(dead_code)]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_parent_chunk_size: default_max_parent_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_max_parent_chunk_size() -> usize {
    1500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Candidate pool size for a first-pass index query.
    #[serde(default = "default_top_k_retrieval")]
    #[allow(dead_code)]
    pub top_k_retrieval: usize,
    /// Number of boosted results handed to answer generation.
    #[serde(default = "default_top_k_rerank")]
    pub top_k_rerank: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_retrieval: default_top_k_retrieval(),
            top_k_rerank: default_top_k_rerank(),
        }
    }
}

fn default_top_k_retrieval() -> usize {
    10
}
fn default_top_k_rerank() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    /// TTL for cached answers, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// TTL for cached document chunks, in seconds.
    #[serde(default = "default_document_ttl_secs")]
    pub document_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
            document_ttl_secs: default_document_ttl_secs(),
        }
    }
}

fn default_cache_max_entries() -> usize {
    1000
}
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_document_ttl_secs() -> u64 {
    7200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"` or `"ollama"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Vector dimensionality; must match the remote index.
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            url: None,
            batch_size: default_embedding_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text-v1.5".to_string()
}
fn default_embedding_dims() -> usize {
    768
}
fn default_embedding_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndexConfig {
    /// Base URL of the managed index, e.g. `https://my-index-abc123.svc.pinecone.io`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_llm_top_k")]
    pub top_k: u32,
    /// Total attempts per question (1 initial + retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_llm_top_k(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_max_output_tokens() -> u32 {
    1000
}
fn default_temperature() -> f64 {
    0.1
}
fn default_top_p() -> f64 {
    0.8
}
fn default_llm_top_k() -> u32 {
    40
}
fn default_max_attempts() -> u32 {
    3
}

impl Config {
    /// Default configuration for tests and tooling that never reaches
    /// remote services.
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            llm: LlmConfig::default(),
            log_level: default_log_level(),
        }
    }

    /// The effective bearer token: environment variable wins over the file.
    pub fn auth_token(&self) -> Option<String> {
        std::env::var(AUTH_TOKEN_VAR)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.server.auth_token.clone())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.max_parent_chunk_size < config.chunking.chunk_size {
        anyhow::bail!("chunking.max_parent_chunk_size must be >= chunking.chunk_size");
    }

    if config.retrieval.top_k_rerank < 1 {
        anyhow::bail!("retrieval.top_k_rerank must be >= 1");
    }

    if config.cache.max_entries < 1 {
        anyhow::bail!("cache.max_entries must be >= 1");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai or ollama.",
            other
        ),
    }

    if config.llm.max_attempts < 1 {
        anyhow::bail!("llm.max_attempts must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_applied_for_empty_file() {
        let f = write_config("");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 500);
        assert_eq!(cfg.chunking.max_parent_chunk_size, 1500);
        assert_eq!(cfg.retrieval.top_k_rerank, 5);
        assert_eq!(cfg.cache.max_entries, 1000);
        assert_eq!(cfg.embedding.dims, 768);
        assert_eq!(cfg.llm.max_attempts, 3);
        assert_eq!(cfg.server.bind, "0.0.0.0:8000");
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let f = write_config("[chunking]\nchunk_size = 0\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn rejects_parent_smaller_than_child() {
        let f = write_config("[chunking]\nchunk_size = 500\nmax_parent_chunk_size = 100\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        let f = write_config("[embedding]\nprovider = \"sentencepiece\"\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn parses_overrides() {
        let f = write_config(
            r#"
log_level = "debug"

[server]
bind = "127.0.0.1:9100"

[retrieval]
top_k_retrieval = 20
top_k_rerank = 8

[index]
host = "https://example-index.svc.pinecone.io"
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9100");
        assert_eq!(cfg.retrieval.top_k_rerank, 8);
        assert_eq!(
            cfg.index.host.as_deref(),
            Some("https://example-index.svc.pinecone.io")
        );
        assert_eq!(cfg.log_level, "debug");
    }
}
