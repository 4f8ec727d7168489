/// Centralized error types for codescout using thiserror
///
/// Every public operation returns either a success payload or an error
/// carrying a stable machine-readable kind plus a human-readable message
/// including the offending path or collection where relevant.
use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Path does not exist or is not a directory: {0}")]
    PathNotFound(String),

    #[error("Codebase is already indexed: {0} (pass force=true to re-index)")]
    AlreadyIndexed(String),

    #[error("Codebase is already being indexed: {0}")]
    AlreadyIndexing(String),

    #[error("Codebase is not indexed: {0}")]
    NotIndexed(String),

    #[error("Invalid splitter '{0}': expected 'ast' or 'langchain'")]
    InvalidSplitter(String),

    #[error("Invalid extension filter entry '{0}': must match ^\\.[A-Za-z0-9_+-]+$")]
    InvalidExtensionFilter(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("BM25 error: {0}")]
    Bm25(#[from] Bm25Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("Chunking error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the BM25 sparse model
#[derive(Error, Debug)]
pub enum Bm25Error {
    #[error("Cannot train BM25 model on an empty corpus")]
    EmptyCorpus,

    #[error("BM25 model is not trained; call learn() first")]
    NotTrained,

    #[error("Failed to serialize BM25 model: {0}")]
    Serialize(String),

    #[error("Failed to deserialize BM25 model: {0}")]
    Deserialize(String),
}

/// Errors raised by embedding providers
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding provider failure (retryable={retryable}): {message}")]
    Provider { message: String, retryable: bool },

    #[error("Embedding request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Whether the failure is worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Provider { retryable, .. } => *retryable,
            EmbeddingError::Timeout(_) => true,
            EmbeddingError::InvalidResponse(_) | EmbeddingError::DimensionMismatch { .. } => false,
        }
    }
}

/// Errors raised by vector store backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to connect to vector store: {0}")]
    ConnectionFailed(String),

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Failed to create collection '{collection}': {reason}")]
    CollectionCreationFailed { collection: String, reason: String },

    #[error("Collection limit reached: {0}")]
    CollectionLimitReached(String),

    #[error("Failed to insert documents: {0}")]
    InsertFailed(String),

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Backend does not support this filter expression: {0}. Use a trivial filter or a backend with server-side filtering.")]
    UnsupportedFilter(String),

    #[error("Backend does not support deletion: {0}. Drop and recreate the collection to remove documents.")]
    UnsupportedDeletion(String),

    #[error("Invalid filter expression '{expr}': {reason}")]
    InvalidFilter { expr: String, reason: String },
}

/// Errors raised while chunking a file
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Failed to parse {language} source: {reason}")]
    ParseFailed { language: String, reason: String },

    #[error("Invalid chunk configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by the snapshot store
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to read snapshot '{path}': {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Failed to write snapshot '{path}': {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Snapshot file is corrupted: {0}")]
    Corrupted(String),
}

impl Error {
    /// Stable machine-readable kind for the user-visible failure format
    pub fn kind(&self) -> &'static str {
        match self {
            Error::PathNotFound(_) => "path_not_found",
            Error::AlreadyIndexed(_) => "already_indexed",
            Error::AlreadyIndexing(_) => "already_indexing",
            Error::NotIndexed(_) => "not_indexed",
            Error::InvalidSplitter(_) => "invalid_splitter",
            Error::InvalidExtensionFilter(_) => "invalid_extension_filter",
            Error::Cancelled => "cancelled",
            Error::Bm25(Bm25Error::EmptyCorpus) => "empty_corpus",
            Error::Bm25(Bm25Error::NotTrained) => "not_trained",
            Error::Bm25(_) => "bm25_error",
            Error::Embedding(_) => "embedding_error",
            Error::Store(StoreError::CollectionLimitReached(_)) => "collection_limit_reached",
            Error::Store(StoreError::UnsupportedFilter(_)) => "unsupported_filter",
            Error::Store(StoreError::UnsupportedDeletion(_)) => "unsupported_deletion",
            Error::Store(_) => "store_error",
            Error::Chunk(_) => "chunk_error",
            Error::Snapshot(_) => "snapshot_error",
            Error::Io(_) => "io_error",
        }
    }

    /// Check if this error is retryable at the operation level
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Embedding(e) => e.is_retryable(),
            Error::Store(StoreError::ConnectionFailed(_)) => true,
            Error::Io(_) => true,
            _ => false,
        }
    }
}

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PathNotFound("/missing".to_string());
        assert_eq!(
            err.to_string(),
            "Path does not exist or is not a directory: /missing"
        );
    }

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(Error::Cancelled.kind(), "cancelled");
        assert_eq!(Error::Bm25(Bm25Error::EmptyCorpus).kind(), "empty_corpus");
        assert_eq!(Error::Bm25(Bm25Error::NotTrained).kind(), "not_trained");
        assert_eq!(
            Error::Store(StoreError::CollectionLimitReached("near capacity".into())).kind(),
            "collection_limit_reached"
        );
        assert_eq!(
            Error::Store(StoreError::UnsupportedDeletion("flat index".into())).kind(),
            "unsupported_deletion"
        );
    }

    #[test]
    fn test_embedding_retryability() {
        let retryable = EmbeddingError::Provider {
            message: "rate limit exceeded".into(),
            retryable: true,
        };
        assert!(retryable.is_retryable());

        let fatal = EmbeddingError::Provider {
            message: "invalid api key".into(),
            retryable: false,
        };
        assert!(!fatal.is_retryable());
        assert!(EmbeddingError::Timeout(30).is_retryable());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unsupported_deletion_suggests_workaround() {
        let err = StoreError::UnsupportedDeletion("flat backend".into());
        assert!(err.to_string().contains("Drop and recreate"));
    }
}
