//! Path normalization and collection naming

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Prefix shared by every codescout collection
pub const COLLECTION_PREFIX: &str = "code_chunks_";

/// Canonicalise a codebase root.
///
/// The returned path is absolute with symlinks resolved, so the same
/// directory always maps to the same collection regardless of how the
/// caller spelled it.
pub fn canonical_root(root: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let canonical = root
        .canonicalize()
        .map_err(|_| Error::PathNotFound(root.display().to_string()))?;
    if !canonical.is_dir() {
        return Err(Error::PathNotFound(root.display().to_string()));
    }
    Ok(canonical)
}

/// Deterministic collection name for a canonical root:
/// `code_chunks_<first 16 hex of sha256(root)>`.
pub fn collection_name(canonical_root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_root.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", COLLECTION_PREFIX, &hex[..16])
}

/// Relative path with forward slashes on every platform
pub fn relative_slash_path(root: &Path, absolute: &Path) -> String {
    let rel = absolute.strip_prefix(root).unwrap_or(absolute);
    let s = rel.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// SHA-256 hex digest of raw file bytes
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_deterministic() {
        let a = collection_name(Path::new("/home/user/project"));
        let b = collection_name(Path::new("/home/user/project"));
        assert_eq!(a, b);
        assert!(a.starts_with(COLLECTION_PREFIX));
        assert_eq!(a.len(), COLLECTION_PREFIX.len() + 16);
    }

    #[test]
    fn test_collection_name_distinct_roots() {
        let a = collection_name(Path::new("/home/user/project-a"));
        let b = collection_name(Path::new("/home/user/project-b"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_canonical_root_rejects_missing() {
        let err = canonical_root("/definitely/not/a/real/path").unwrap_err();
        assert_eq!(err.kind(), "path_not_found");
    }

    #[test]
    fn test_canonical_root_rejects_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = canonical_root(file.path()).unwrap_err();
        assert_eq!(err.kind(), "path_not_found");
    }

    #[test]
    fn test_relative_slash_path() {
        let root = Path::new("/repo");
        let abs = Path::new("/repo/src/lib.rs");
        assert_eq!(relative_slash_path(root, abs), "src/lib.rs");
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let hash = content_hash(b"hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
