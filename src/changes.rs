//! File change detection against a prior snapshot

use crate::error::Result;
use crate::paths::content_hash;
use crate::snapshot::SnapshotStore;
use crate::walker::FileWalker;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Deltas between the prior snapshot and the current file set.
///
/// All lists are sorted lexicographically by relative path. The caller
/// persists `new_snapshot` only after the downstream operation succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub new_snapshot: BTreeMap<String, String>,
}

impl ChangeSet {
    pub fn total(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Computes `{added, modified, removed}` for a codebase root
pub struct ChangeDetector {
    snapshots: Arc<SnapshotStore>,
}

impl ChangeDetector {
    pub fn new(snapshots: Arc<SnapshotStore>) -> Self {
        Self { snapshots }
    }

    /// Diff the current file set under `canonical_root` against the prior
    /// snapshot.
    ///
    /// Unreadable files are skipped with a WARN and left out of the new
    /// snapshot (they will be treated as removed).
    pub fn diff(
        &self,
        canonical_root: &Path,
        allowed_extensions: &[String],
        ignore_patterns: &[String],
        max_file_size: u64,
    ) -> Result<ChangeSet> {
        let prior = self.snapshots.load(canonical_root)?;
        let walker = FileWalker::new(
            canonical_root,
            allowed_extensions,
            ignore_patterns,
            max_file_size,
        );
        let current = walker.walk()?;

        let mut new_snapshot = BTreeMap::new();
        for file in &current {
            match fs::read(&file.absolute_path) {
                Ok(bytes) => {
                    new_snapshot.insert(file.relative_path.clone(), content_hash(&bytes));
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable file {}: {}", file.relative_path, e);
                }
            }
        }

        let mut added = Vec::new();
        let mut modified = Vec::new();
        for (path, hash) in &new_snapshot {
            match prior.get(path) {
                None => added.push(path.clone()),
                Some(old_hash) if old_hash != hash => modified.push(path.clone()),
                Some(_) => {}
            }
        }

        let mut removed: Vec<String> = prior
            .keys()
            .filter(|path| !new_snapshot.contains_key(*path))
            .cloned()
            .collect();

        // BTreeMap iteration is already sorted; removed needs it explicitly
        removed.sort();

        Ok(ChangeSet {
            added,
            modified,
            removed,
            new_snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn detector(dir: &Path) -> (ChangeDetector, Arc<SnapshotStore>) {
        let store = Arc::new(SnapshotStore::new(dir.join(".snapshots")));
        (ChangeDetector::new(store.clone()), store)
    }

    #[test]
    fn test_first_run_everything_added() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "a.rs", "fn a() {}");
        write(&root, "b.rs", "fn b() {}");

        let (detector, _) = detector(dir.path());
        let changes = detector.diff(&root, &[], &[], 1_048_576).unwrap();

        assert_eq!(changes.added, vec!["a.rs", "b.rs"]);
        assert!(changes.modified.is_empty());
        assert!(changes.removed.is_empty());
        assert_eq!(changes.new_snapshot.len(), 2);
    }

    #[test]
    fn test_rerun_after_persist_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "a.rs", "fn a() {}");

        let (detector, snapshots) = detector(dir.path());
        let first = detector.diff(&root, &[], &[], 1_048_576).unwrap();
        snapshots.save(&root, &first.new_snapshot).unwrap();

        let second = detector.diff(&root, &[], &[], 1_048_576).unwrap();
        assert!(second.is_empty());
        assert_eq!(second.new_snapshot, first.new_snapshot);
    }

    #[test]
    fn test_modify_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "keep.rs", "fn keep() {}");
        write(&root, "edit.rs", "fn before() {}");
        write(&root, "gone.rs", "fn gone() {}");

        let (detector, snapshots) = detector(dir.path());
        let first = detector.diff(&root, &[], &[], 1_048_576).unwrap();
        snapshots.save(&root, &first.new_snapshot).unwrap();

        write(&root, "edit.rs", "fn after() {}");
        fs::remove_file(root.join("gone.rs")).unwrap();
        write(&root, "fresh.rs", "fn fresh() {}");

        let changes = detector.diff(&root, &[], &[], 1_048_576).unwrap();
        assert_eq!(changes.added, vec!["fresh.rs"]);
        assert_eq!(changes.modified, vec!["edit.rs"]);
        assert_eq!(changes.removed, vec!["gone.rs"]);
        assert_eq!(changes.total(), 3);
    }

    #[test]
    fn test_touch_without_content_change_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "a.rs", "fn a() {}");

        let (detector, snapshots) = detector(dir.path());
        let first = detector.diff(&root, &[], &[], 1_048_576).unwrap();
        snapshots.save(&root, &first.new_snapshot).unwrap();

        // Rewrite identical bytes; the digest is unchanged
        write(&root, "a.rs", "fn a() {}");
        let changes = detector.diff(&root, &[], &[], 1_048_576).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_output_lists_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "z.rs", "fn z() {}");
        write(&root, "a.rs", "fn a() {}");
        write(&root, "m/mid.rs", "fn m() {}");

        let (detector, _) = detector(dir.path());
        let changes = detector.diff(&root, &[], &[], 1_048_576).unwrap();
        let mut sorted = changes.added.clone();
        sorted.sort();
        assert_eq!(changes.added, sorted);
    }
}
