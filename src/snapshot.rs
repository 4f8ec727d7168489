//! Per-codebase file-hash snapshots
//!
//! One JSON file per codebase: `{ "version": 1, "root": "...", "files":
//! { "<rel path>": "<hex sha256>", ... } }`. Paths use forward slashes on
//! every platform. Writes are atomic: serialise to a temp file in the
//! same directory, fsync, then rename over the target, so a crash leaves
//! either the previous snapshot intact or the new one complete.

use crate::error::SnapshotError;
use crate::paths::collection_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    root: String,
    files: BTreeMap<String, String>,
}

/// Persists file→hash maps, keyed by canonical codebase root
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// The snapshot directory is chosen by the host and treated as opaque
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, canonical_root: &Path) -> PathBuf {
        self.dir.join(format!("{}.json", collection_name(canonical_root)))
    }

    pub fn exists(&self, canonical_root: &Path) -> bool {
        self.path_for(canonical_root).exists()
    }

    /// Load the snapshot for `canonical_root`; empty map on first use
    pub fn load(
        &self,
        canonical_root: &Path,
    ) -> Result<BTreeMap<String, String>, SnapshotError> {
        let path = self.path_for(canonical_root);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| SnapshotError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let snapshot: SnapshotFile =
            serde_json::from_str(&content).map_err(|e| SnapshotError::Corrupted(e.to_string()))?;
        Ok(snapshot.files)
    }

    /// Atomically replace the snapshot for `canonical_root`
    pub fn save(
        &self,
        canonical_root: &Path,
        files: &BTreeMap<String, String>,
    ) -> Result<(), SnapshotError> {
        let path = self.path_for(canonical_root);
        let write_failed = |reason: String| SnapshotError::WriteFailed {
            path: path.display().to_string(),
            reason,
        };

        fs::create_dir_all(&self.dir).map_err(|e| write_failed(e.to_string()))?;

        let snapshot = SnapshotFile {
            version: SNAPSHOT_VERSION,
            root: canonical_root.to_string_lossy().into_owned(),
            files: files.clone(),
        };
        let content =
            serde_json::to_string_pretty(&snapshot).map_err(|e| write_failed(e.to_string()))?;

        // Temp file in the same directory so the rename stays on one filesystem
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| write_failed(e.to_string()))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| write_failed(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| write_failed(e.to_string()))?;
        tmp.persist(&path)
            .map_err(|e| write_failed(e.to_string()))?;

        tracing::debug!("Saved snapshot ({} files) to {:?}", files.len(), path);
        Ok(())
    }

    /// Remove the snapshot; missing is not an error
    pub fn delete(&self, canonical_root: &Path) -> Result<(), SnapshotError> {
        let path = self.path_for(canonical_root);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SnapshotError::WriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_files() -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        files.insert("src/lib.rs".to_string(), "a".repeat(64));
        files.insert("src/main.rs".to_string(), "b".repeat(64));
        files
    }

    #[test]
    fn test_load_missing_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let files = store.load(Path::new("/some/project")).unwrap();
        assert!(files.is_empty());
        assert!(!store.exists(Path::new("/some/project")));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let root = Path::new("/some/project");

        store.save(root, &sample_files()).unwrap();
        assert!(store.exists(root));
        assert_eq!(store.load(root).unwrap(), sample_files());
    }

    #[test]
    fn test_save_overwrites_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let root = Path::new("/some/project");

        store.save(root, &sample_files()).unwrap();

        let mut updated = sample_files();
        updated.insert("src/new.rs".to_string(), "c".repeat(64));
        store.save(root, &updated).unwrap();

        assert_eq!(store.load(root).unwrap().len(), 3);
    }

    #[test]
    fn test_file_layout_has_version_and_forward_slashes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let root = Path::new("/some/project");
        store.save(root, &sample_files()).unwrap();

        let path = store.path_for(root);
        let raw = fs::read_to_string(path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["version"], 1);
        assert_eq!(parsed["root"], "/some/project");
        assert!(parsed["files"]["src/lib.rs"].is_string());
    }

    #[test]
    fn test_corrupted_snapshot_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let root = Path::new("/some/project");
        fs::write(store.path_for(root), "{ not json").unwrap();

        assert!(matches!(
            store.load(root),
            Err(SnapshotError::Corrupted(_))
        ));
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.delete(Path::new("/never/indexed")).unwrap();
    }

    #[test]
    fn test_delete_removes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let root = Path::new("/some/project");
        store.save(root, &sample_files()).unwrap();
        store.delete(root).unwrap();
        assert!(!store.exists(root));
    }

    #[test]
    fn test_distinct_roots_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.save(Path::new("/project/a"), &sample_files()).unwrap();
        let mut other = BTreeMap::new();
        other.insert("x.py".to_string(), "d".repeat(64));
        store.save(Path::new("/project/b"), &other).unwrap();

        assert_eq!(store.load(Path::new("/project/a")).unwrap().len(), 2);
        assert_eq!(store.load(Path::new("/project/b")).unwrap().len(), 1);
    }
}
