/// Configuration for codescout
///
/// All values have working defaults; the environment can override the log
/// level, the environment mode, and the backend connection endpoint.
use serde::{Deserialize, Serialize};

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Indexing configuration
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Chunks per embedding batch
    #[serde(default = "default_embed_batch")]
    pub embed_batch: usize,

    /// Documents per store insert batch
    #[serde(default = "default_insert_batch")]
    pub insert_batch: usize,

    /// Maximum file size in bytes (larger files are skipped with a WARN)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Additional ignore patterns appended to the built-in defaults
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Allowed file extensions; empty means the built-in default set
    #[serde(default)]
    pub allowed_extensions: Vec<String>,

    /// Maximum characters per AST chunk before recursive splitting
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Small-sibling merge threshold in characters
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,

    /// Size-based splitter chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Size-based splitter overlap in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default result limit
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// RRF fusion constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// Maximum sparse terms kept per query
    #[serde(default = "default_max_query_terms")]
    pub max_query_terms: usize,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider tag: "openai" (any OpenAI-compatible API) or "ollama"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Provider endpoint (OpenAI-compatible base URL or Ollama host)
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Known embedding dimension; None means probe the provider
    #[serde(default)]
    pub dimension: Option<usize>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Maximum retry attempts for retryable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds (doubles per attempt, capped at 10s)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend tag: "memory", "flat", "qdrant", or "milvus"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Backend connection endpoint (network backends only)
    #[serde(default = "default_store_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

// Default value functions

fn default_embed_batch() -> usize {
    64
}

fn default_insert_batch() -> usize {
    128
}

fn default_max_file_size() -> u64 {
    1_048_576 // 1 MiB
}

fn default_max_chunk_chars() -> usize {
    2500
}

fn default_min_chunk_chars() -> usize {
    200
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_limit() -> usize {
    10
}

fn default_rrf_k() -> f32 {
    60.0
}

fn default_max_query_terms() -> usize {
    256
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

fn default_embedding_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_store_backend() -> String {
    "memory".to_string()
}

fn default_store_endpoint() -> String {
    "http://localhost:6334".to_string()
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            embed_batch: default_embed_batch(),
            insert_batch: default_insert_batch(),
            max_file_size: default_max_file_size(),
            ignore_patterns: Vec::new(),
            allowed_extensions: Vec::new(),
            max_chunk_chars: default_max_chunk_chars(),
            min_chunk_chars: default_min_chunk_chars(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            rrf_k: default_rrf_k(),
            max_query_terms: default_max_query_terms(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            dimension: None,
            timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            endpoint: default_store_endpoint(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    /// Apply the recognised environment overrides.
    ///
    /// `CODESCOUT_ENDPOINT` points the configured store backend at a
    /// different connection endpoint. Log level and environment mode are
    /// consumed by [`crate::logging::init`], not here.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("CODESCOUT_ENDPOINT") {
            if !endpoint.is_empty() {
                self.store.endpoint = endpoint;
            }
        }
        self
    }
}
