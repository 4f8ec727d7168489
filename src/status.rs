//! Per-codebase status registry
//!
//! The registry is the source of truth for lifecycle state within the
//! running process. Every read is served from memory; disk is used only
//! to hydrate at construction and to durably record transitions. A
//! transition updates memory first and persists from a background task,
//! so `status()` observes the new state immediately regardless of disk.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Terminal outcome of an indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOutcome {
    Completed,
    LimitReached,
}

impl IndexOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexOutcome::Completed => "completed",
            IndexOutcome::LimitReached => "limit_reached",
        }
    }
}

/// Lifecycle state of one codebase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CodebaseStatus {
    Indexing {
        progress: f32,
    },
    Indexed {
        indexed_files: u64,
        total_chunks: u64,
        status: IndexOutcome,
    },
    #[serde(rename = "indexfailed")]
    IndexFailed {
        error_message: String,
        last_attempted_percentage: f32,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    codebases: HashMap<String, CodebaseStatus>,
}

/// In-memory authoritative registry with crash-safe disk persistence
pub struct StatusRegistry {
    entries: RwLock<HashMap<String, CodebaseStatus>>,
    disk_path: PathBuf,
}

impl StatusRegistry {
    /// Create a registry backed by `disk_path`, hydrating any previous
    /// state. A missing file starts empty; a corrupted file is dropped
    /// with a WARN (memory is authoritative for the life of the process).
    pub fn new(disk_path: impl Into<PathBuf>) -> Arc<Self> {
        let disk_path = disk_path.into();
        let entries = match std::fs::read_to_string(&disk_path) {
            Ok(content) => match serde_json::from_str::<RegistryFile>(&content) {
                Ok(file) => file.codebases,
                Err(e) => {
                    tracing::warn!("Dropping corrupted status registry file: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Arc::new(Self {
            entries: RwLock::new(entries),
            disk_path,
        })
    }

    /// Pure in-memory read; never touches disk or network
    pub fn get(&self, root: &str) -> Option<CodebaseStatus> {
        self.read_lock().get(root).cloned()
    }

    pub fn is_indexing(&self, root: &str) -> bool {
        matches!(self.get(root), Some(CodebaseStatus::Indexing { .. }))
    }

    pub fn is_indexed(&self, root: &str) -> bool {
        matches!(self.get(root), Some(CodebaseStatus::Indexed { .. }))
    }

    /// Snapshot of all known codebases, sorted by root
    pub fn list(&self) -> Vec<(String, CodebaseStatus)> {
        let mut entries: Vec<(String, CodebaseStatus)> = self
            .read_lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn count_indexed(&self) -> usize {
        self.read_lock()
            .values()
            .filter(|s| matches!(s, CodebaseStatus::Indexed { .. }))
            .count()
    }

    pub fn set_indexing(self: &Arc<Self>, root: &str) {
        self.transition(root, CodebaseStatus::Indexing { progress: 0.0 });
    }

    pub fn set_progress(self: &Arc<Self>, root: &str, progress: f32) {
        let progress = progress.clamp(0.0, 100.0);
        {
            let mut entries = self.write_lock();
            match entries.get_mut(root) {
                Some(CodebaseStatus::Indexing { progress: current }) => {
                    // Progress is monotonically non-decreasing within a run
                    *current = current.max(progress);
                }
                _ => {
                    entries.insert(root.to_string(), CodebaseStatus::Indexing { progress });
                }
            }
        }
        self.persist_async();
    }

    pub fn set_indexed(
        self: &Arc<Self>,
        root: &str,
        indexed_files: u64,
        total_chunks: u64,
        status: IndexOutcome,
    ) {
        self.transition(
            root,
            CodebaseStatus::Indexed {
                indexed_files,
                total_chunks,
                status,
            },
        );
    }

    pub fn set_failed(self: &Arc<Self>, root: &str, error_message: &str, last_pct: f32) {
        self.transition(
            root,
            CodebaseStatus::IndexFailed {
                error_message: error_message.to_string(),
                last_attempted_percentage: last_pct.clamp(0.0, 100.0),
            },
        );
    }

    /// Remove the entry for `root` entirely
    pub fn clear(self: &Arc<Self>, root: &str) {
        self.write_lock().remove(root);
        self.persist_async();
    }

    /// Memory first, disk after: any `get` that follows this call observes
    /// the new state even while the disk write is still in flight
    fn transition(self: &Arc<Self>, root: &str, status: CodebaseStatus) {
        self.write_lock().insert(root.to_string(), status);
        self.persist_async();
    }

    /// Fire-and-forget crash-safe persistence. If it fails, the in-memory
    /// state remains authoritative and a WARN is logged.
    fn persist_async(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _ = tokio::task::spawn_blocking(move || registry.persist_now()).await;
                });
            }
            // No runtime (sync caller): persist inline
            Err(_) => self.persist_now(),
        }
    }

    fn persist_now(&self) {
        let file = RegistryFile {
            codebases: self.read_lock().clone(),
        };

        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.disk_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(&file)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let dir = self
                .disk_path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&self.disk_path)
                .map_err(|e| e.error)?;
            Ok(())
        })();

        if let Err(e) = result {
            tracing::warn!(
                "Failed to persist status registry to {:?}: {} (in-memory state remains authoritative)",
                self.disk_path,
                e
            );
        }
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CodebaseStatus>> {
        self.entries.read().unwrap_or_else(|poison| poison.into_inner())
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CodebaseStatus>> {
        self.entries.write().unwrap_or_else(|poison| poison.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(dir: &std::path::Path) -> Arc<StatusRegistry> {
        StatusRegistry::new(dir.join("registry.json"))
    }

    #[tokio::test]
    async fn test_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        assert!(registry.get("/repo").is_none());

        registry.set_indexing("/repo");
        assert_eq!(
            registry.get("/repo"),
            Some(CodebaseStatus::Indexing { progress: 0.0 })
        );

        registry.set_progress("/repo", 42.0);
        assert_eq!(
            registry.get("/repo"),
            Some(CodebaseStatus::Indexing { progress: 42.0 })
        );

        registry.set_indexed("/repo", 10, 25, IndexOutcome::Completed);
        assert!(registry.is_indexed("/repo"));

        registry.clear("/repo");
        assert!(registry.get("/repo").is_none());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        registry.set_indexing("/repo");
        registry.set_progress("/repo", 60.0);
        registry.set_progress("/repo", 30.0);
        assert_eq!(
            registry.get("/repo"),
            Some(CodebaseStatus::Indexing { progress: 60.0 })
        );
        registry.set_progress("/repo", 250.0);
        assert_eq!(
            registry.get("/repo"),
            Some(CodebaseStatus::Indexing { progress: 100.0 })
        );
    }

    #[tokio::test]
    async fn test_set_indexed_visible_before_disk_write() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        registry.set_indexing("/repo");
        registry.set_indexed("/repo", 2, 2, IndexOutcome::Completed);

        // Immediately observable from another thread, no disk round-trip
        let cloned = Arc::clone(&registry);
        let seen = std::thread::spawn(move || cloned.get("/repo"))
            .join()
            .unwrap();
        assert_eq!(
            seen,
            Some(CodebaseStatus::Indexed {
                indexed_files: 2,
                total_chunks: 2,
                status: IndexOutcome::Completed,
            })
        );
    }

    #[tokio::test]
    async fn test_failed_state() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        registry.set_indexing("/repo");
        registry.set_failed("/repo", "cancelled", 37.5);
        match registry.get("/repo") {
            Some(CodebaseStatus::IndexFailed {
                error_message,
                last_attempted_percentage,
            }) => {
                assert_eq!(error_message, "cancelled");
                assert_eq!(last_attempted_percentage, 37.5);
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hydration_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        {
            let registry = StatusRegistry::new(&path);
            registry.set_indexed("/repo", 5, 12, IndexOutcome::LimitReached);
            // Force the write to complete before "restarting"
            registry.persist_now();
        }

        let reborn = StatusRegistry::new(&path);
        assert_eq!(
            reborn.get("/repo"),
            Some(CodebaseStatus::Indexed {
                indexed_files: 5,
                total_chunks: 12,
                status: IndexOutcome::LimitReached,
            })
        );
    }

    #[tokio::test]
    async fn test_corrupted_registry_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "{{{ nope").unwrap();

        let registry = StatusRegistry::new(&path);
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn test_count_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        registry.set_indexed("/a", 1, 1, IndexOutcome::Completed);
        registry.set_indexed("/b", 2, 2, IndexOutcome::Completed);
        registry.set_indexing("/c");
        assert_eq!(registry.count_indexed(), 2);
    }

    #[test]
    fn test_status_serialization_tags() {
        let status = CodebaseStatus::Indexed {
            indexed_files: 1,
            total_chunks: 2,
            status: IndexOutcome::LimitReached,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "indexed");
        assert_eq!(json["status"], "limit_reached");

        let failed = CodebaseStatus::IndexFailed {
            error_message: "boom".into(),
            last_attempted_percentage: 12.0,
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["state"], "indexfailed");
    }
}
