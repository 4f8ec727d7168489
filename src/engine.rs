//! High-level engine facade
//!
//! [`CodeScout`] wires the store backend, embedding provider, snapshot
//! store, status registry, and BM25 hand-over point together from a
//! [`Config`], and exposes the five public operations: index, reindex by
//! change, clear, search, and status.

use crate::bm25::Bm25Store;
use crate::config::{Config, EmbeddingConfig, StoreConfig};
use crate::embedding::{EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};
use crate::error::{EmbeddingError, Error, Result, StoreError};
use crate::indexer::{ClearStats, IndexOptions, IndexStats, Indexer, ProgressCallback, ReindexStats};
use crate::search::{SearchRequest, SearchResponse, Searcher};
use crate::snapshot::SnapshotStore;
use crate::status::{CodebaseStatus, StatusRegistry};
use crate::store::{FlatStore, MemoryStore, MilvusStore, QdrantStore, VectorStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The assembled engine: one value serving any number of codebases
pub struct CodeScout {
    indexer: Indexer,
    searcher: Searcher,
}

impl CodeScout {
    /// Build an engine from configuration.
    ///
    /// `state_dir` hosts the snapshots, the status registry, and the
    /// BM25 model mirrors; the engine treats its layout as private.
    pub async fn new(config: Config, state_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = build_store(&config.store).await?;
        let embedder = build_embedder(&config.embedding)?;
        Self::with_components(store, embedder, config, state_dir)
    }

    /// Build an engine around caller-provided store and embedder
    pub fn with_components(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        config: Config,
        state_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let state_dir = state_dir.into();
        let snapshots = Arc::new(SnapshotStore::new(state_dir.join("snapshots")));
        let registry = StatusRegistry::new(state_dir.join("registry.json"));
        let bm25 = Arc::new(Bm25Store::new(state_dir.join("bm25")));

        let indexer = Indexer::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            snapshots,
            Arc::clone(&registry),
            Arc::clone(&bm25),
            config.indexing,
        )?;
        let searcher = Searcher::new(store, embedder, registry, bm25, config.search);

        Ok(Self { indexer, searcher })
    }

    /// Index a codebase from scratch (see [`Indexer::index_codebase`])
    pub async fn index_codebase(
        &self,
        root: impl AsRef<Path>,
        options: IndexOptions,
    ) -> Result<IndexStats> {
        self.indexer
            .index_codebase(root, options, None, CancellationToken::new())
            .await
    }

    /// Same as [`CodeScout::index_codebase`] with progress reporting and
    /// cancellation
    pub async fn index_codebase_with(
        &self,
        root: impl AsRef<Path>,
        options: IndexOptions,
        progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<IndexStats> {
        self.indexer
            .index_codebase(root, options, progress, cancel)
            .await
    }

    /// Apply only the file changes since the last snapshot
    pub async fn reindex_by_change(&self, root: impl AsRef<Path>) -> Result<ReindexStats> {
        self.indexer
            .reindex_by_change(root, None, CancellationToken::new())
            .await
    }

    /// Drop everything known about a codebase
    pub async fn clear_index(&self, root: impl AsRef<Path>) -> Result<ClearStats> {
        self.indexer.clear(root).await
    }

    /// Hybrid search over an indexed codebase
    pub async fn search_code(
        &self,
        root: impl AsRef<Path>,
        query: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        self.searcher.search(root, query, request).await
    }

    /// Lifecycle state for a codebase; `None` means never indexed
    pub fn get_indexing_status(&self, root: impl AsRef<Path>) -> Option<CodebaseStatus> {
        self.indexer.status(root)
    }

    /// All known codebases with their states
    pub fn list_indexed(&self) -> Vec<(String, CodebaseStatus)> {
        self.indexer.list_indexed()
    }
}

/// Instantiate the configured store backend
async fn build_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "flat" => Ok(Arc::new(FlatStore::new())),
        "qdrant" => {
            let store = QdrantStore::connect(&config.endpoint, config.timeout_secs).await?;
            Ok(Arc::new(store))
        }
        "milvus" => {
            let token = std::env::var("MILVUS_TOKEN").ok().filter(|t| !t.is_empty());
            let store = MilvusStore::connect(&config.endpoint, token, config.timeout_secs)?;
            Ok(Arc::new(store))
        }
        other => Err(Error::Store(StoreError::ConnectionFailed(format!(
            "unknown store backend '{other}' (expected memory, flat, qdrant, or milvus)"
        )))),
    }
}

/// Instantiate the configured embedding provider
fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingClient>> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
            Ok(Arc::new(OpenAiEmbedding::new(config, api_key)?))
        }
        "ollama" => Ok(Arc::new(OllamaEmbedding::new(config)?)),
        other => Err(Error::Embedding(EmbeddingError::Provider {
            message: format!("unknown embedding provider '{other}' (expected openai or ollama)"),
            retryable: false,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_backend_rejected() {
        let config = StoreConfig {
            backend: "chroma".to_string(),
            ..Default::default()
        };
        let err = build_store(&config).await.unwrap_err();
        assert_eq!(err.kind(), "store_error");
        assert!(err.to_string().contains("chroma"));
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "bedrock".to_string(),
            ..Default::default()
        };
        let err = build_embedder(&config).unwrap_err();
        assert_eq!(err.kind(), "embedding_error");
    }

    #[tokio::test]
    async fn test_memory_backend_builds() {
        let store = build_store(&StoreConfig::default()).await.unwrap();
        assert!(store.supports_hybrid());
    }

    #[tokio::test]
    async fn test_engine_assembles_with_components() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
        let embedder: Arc<dyn EmbeddingClient> = Arc::new(OllamaEmbedding::new(
            &EmbeddingConfig::default(),
        ).unwrap());

        let engine =
            CodeScout::with_components(store, embedder, Config::default(), dir.path()).unwrap();
        assert!(engine.get_indexing_status("/nowhere").is_none());
        assert!(engine.list_indexed().is_empty());
    }
}
