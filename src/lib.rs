//! # codescout - Semantic Code Search for Large Source Trees
//!
//! Indexes a directory into syntax-aware chunks, embeds them into dense
//! vectors, trains a BM25 sparse model over the same corpus, persists
//! both in a vector store, and answers natural-language queries by
//! fusing dense and sparse retrieval with Reciprocal Rank Fusion.
//! Per-file content hashes make re-indexing incremental: only added,
//! modified, and removed files are touched.
//!
//! ## Architecture
//!
//! - [`walker::FileWalker`]: deterministic file enumeration with
//!   gitignore-style ignore rules
//! - [`chunker::Chunker`]: AST-aware chunking (tree-sitter) with a
//!   size-based fallback
//! - [`bm25::Bm25Model`]: sparse keyword model for the hybrid branch
//! - [`embedding::EmbeddingClient`]: dense embedding providers
//!   (OpenAI-compatible, Ollama) with retry and backoff
//! - [`store::VectorStore`]: collection-per-codebase vector storage
//!   (Qdrant, embedded memory, embedded flat)
//! - [`snapshot::SnapshotStore`] + [`changes::ChangeDetector`]:
//!   file-hash snapshots and `{added, modified, removed}` deltas
//! - [`status::StatusRegistry`]: in-memory authoritative lifecycle state
//! - [`indexer::Indexer`]: full and incremental indexing orchestration
//! - [`search::Searcher`]: query-time hybrid retrieval
//!
//! ## Example
//!
//! ```no_run
//! use codescout::{
//!     bm25::Bm25Store, config::Config, embedding::OllamaEmbedding,
//!     indexer::{IndexOptions, Indexer}, search::{Searcher, SearchRequest},
//!     snapshot::SnapshotStore, status::StatusRegistry, store::MemoryStore,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), codescout::Error> {
//!     let config = Config::default().apply_env_overrides();
//!     let store = Arc::new(MemoryStore::new());
//!     let embedder = Arc::new(OllamaEmbedding::new(&config.embedding)?);
//!     let snapshots = Arc::new(SnapshotStore::new("/var/lib/codescout/snapshots"));
//!     let registry = StatusRegistry::new("/var/lib/codescout/registry.json");
//!     let bm25 = Arc::new(Bm25Store::new("/var/lib/codescout/bm25"));
//!
//!     let indexer = Indexer::new(
//!         store.clone(),
//!         embedder.clone(),
//!         snapshots,
//!         registry.clone(),
//!         bm25.clone(),
//!         config.indexing.clone(),
//!     )?;
//!     let stats = indexer
//!         .index_codebase(
//!             "/path/to/codebase",
//!             IndexOptions::default(),
//!             None,
//!             CancellationToken::new(),
//!         )
//!         .await?;
//!     println!("indexed {} files", stats.indexed_files);
//!
//!     let searcher = Searcher::new(store, embedder, registry, bm25, config.search);
//!     let response = searcher
//!         .search("/path/to/codebase", "authenticate user", &SearchRequest::default())
//!         .await?;
//!     for hit in response.results {
//!         println!("{}:{} ({:.3})", hit.relative_path, hit.start_line, hit.score);
//!     }
//!     Ok(())
//! }
//! ```

/// BM25 sparse model: training, generation, serialization
pub mod bm25;

/// Change detection against file-hash snapshots
pub mod changes;

/// AST-aware and size-based chunking
pub mod chunker;

/// Engine configuration with environment overrides
pub mod config;

/// Embedding provider contract and HTTP adapters
pub mod embedding;

/// High-level facade assembling the engine from configuration
pub mod engine;

/// Error taxonomy with stable machine-readable kinds
pub mod error;

/// Full and incremental indexing orchestration
pub mod indexer;

/// Tracing subscriber wiring
pub mod logging;

/// Path canonicalisation and collection naming
pub mod paths;

/// Query-time hybrid retrieval and RRF fusion
pub mod search;

/// Per-codebase file-hash snapshot persistence
pub mod snapshot;

/// Per-codebase lifecycle status registry
pub mod status;

/// Vector store contract and backends
pub mod store;

/// Deterministic file enumeration
pub mod walker;

pub use config::Config;
pub use engine::CodeScout;
pub use error::{Error, Result};
pub use indexer::{ClearStats, IndexOptions, IndexStats, Indexer, Progress, ReindexStats};
pub use search::{SearchRequest, SearchResponse, SearchResult, Searcher};
pub use status::{CodebaseStatus, IndexOutcome};
