//! Vector store abstraction
//!
//! Backends hold one collection per codebase, dense-only or hybrid
//! (dense + sparse). Four backends ship with the crate: `milvus` and
//! `qdrant` (network), `memory` (embedded, full-featured), and `flat`
//! (embedded, append-only, FAISS-family semantics).

pub mod filter;
mod flat;
mod memory;
mod milvus;
mod qdrant;

pub use filter::FilterExpr;
pub use flat::FlatStore;
pub use memory::MemoryStore;
pub use milvus::MilvusStore;
pub use qdrant::QdrantStore;

use crate::bm25::SparseVector;
use crate::error::StoreError;
use async_trait::async_trait;
use uuid::Uuid;

/// Payload field names shared by every backend
pub mod fields {
    pub const CONTENT: &str = "content";
    pub const RELATIVE_PATH: &str = "relativePath";
    pub const START_LINE: &str = "startLine";
    pub const END_LINE: &str = "endLine";
    pub const FILE_EXTENSION: &str = "fileExtension";
    pub const METADATA: &str = "metadata";
}

/// A document as the store holds it
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDocument {
    /// Deterministic UUID-v5 id, see [`VectorDocument::deterministic_id`]
    pub id: String,
    pub dense_vector: Vec<f32>,
    /// Present on insert into hybrid collections, generated from `content`
    pub sparse_vector: Option<SparseVector>,
    pub content: String,
    /// Forward-slash relative path within the codebase
    pub relative_path: String,
    pub start_line: i64,
    pub end_line: i64,
    /// Extension with leading dot, lower-cased (".rs")
    pub file_extension: String,
    /// Opaque metadata, JSON-encoded into a single string field
    pub metadata: String,
}

impl VectorDocument {
    /// Stable id derived from location and content hash, so re-indexing an
    /// unchanged chunk produces the same id
    pub fn deterministic_id(
        relative_path: &str,
        start_line: i64,
        end_line: i64,
        content_hash: &str,
    ) -> String {
        let seed = format!("{relative_path}:{start_line}:{end_line}:{content_hash}");
        Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes()).to_string()
    }
}

/// A document returned from search, with its (backend-specific) score
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    pub relative_path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub file_extension: String,
    pub metadata: String,
    pub score: f32,
}

/// Dense branch of a search request
#[derive(Debug, Clone)]
pub struct DenseRequest {
    pub vector: Vec<f32>,
    pub limit: usize,
}

/// Sparse branch of a hybrid search request
#[derive(Debug, Clone)]
pub struct SparseRequest {
    pub vector: SparseVector,
    pub limit: usize,
}

/// Options shared by search entry points
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    /// Filter expression in the grammar of [`filter`], if any
    pub filter: Option<String>,
    /// RRF constant for backends that fuse client-side
    pub rrf_k: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            filter: None,
            rrf_k: 60.0,
        }
    }
}

/// A row returned by [`VectorStore::query`]: field name to JSON value
pub type QueryRow = serde_json::Map<String, serde_json::Value>;

/// Contract every vector store backend satisfies.
///
/// Behavioural notes:
/// - Collection names are opaque strings; backends accept anything the
///   engine produces.
/// - `drop_collection` on a missing collection is not an error.
/// - Backends with intrinsic limitations surface them
///   (`UnsupportedDeletion`, `UnsupportedFilter`) instead of hiding them.
/// - `check_collection_limit` returns false when the backend is near
///   capacity; the indexer treats that as the `limit_reached` terminal
///   status.
#[async_trait]
pub trait VectorStore: Send + Sync + std::fmt::Debug {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), StoreError>;

    async fn create_hybrid_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<(), StoreError>;

    async fn drop_collection(&self, name: &str) -> Result<(), StoreError>;

    async fn has_collection(&self, name: &str) -> Result<bool, StoreError>;

    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Whether the named collection carries a sparse vector field
    async fn is_hybrid(&self, name: &str) -> Result<bool, StoreError>;

    /// Whether this backend can host hybrid collections at all
    fn supports_hybrid(&self) -> bool {
        true
    }

    async fn insert(&self, name: &str, documents: Vec<VectorDocument>) -> Result<(), StoreError>;

    async fn insert_hybrid(
        &self,
        name: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<(), StoreError>;

    async fn search(
        &self,
        name: &str,
        dense: DenseRequest,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>, StoreError>;

    async fn hybrid_search(
        &self,
        name: &str,
        dense: DenseRequest,
        sparse: SparseRequest,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>, StoreError>;

    /// Scroll documents matching `filter_expr` (empty string means all)
    async fn query(
        &self,
        name: &str,
        filter_expr: &str,
        output_fields: &[String],
        limit: usize,
    ) -> Result<Vec<QueryRow>, StoreError>;

    async fn delete(&self, name: &str, ids: &[String]) -> Result<(), StoreError>;

    async fn check_collection_limit(&self) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_id_is_stable() {
        let a = VectorDocument::deterministic_id("src/lib.rs", 1, 20, "abc123");
        let b = VectorDocument::deterministic_id("src/lib.rs", 1, 20, "abc123");
        assert_eq!(a, b);
        // Valid UUID
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_deterministic_id_varies_with_inputs() {
        let base = VectorDocument::deterministic_id("src/lib.rs", 1, 20, "abc123");
        assert_ne!(
            base,
            VectorDocument::deterministic_id("src/lib.rs", 1, 20, "abc124")
        );
        assert_ne!(
            base,
            VectorDocument::deterministic_id("src/lib.rs", 2, 20, "abc123")
        );
        assert_ne!(
            base,
            VectorDocument::deterministic_id("src/other.rs", 1, 20, "abc123")
        );
    }
}
