//! File walking functionality for directory traversal

use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Extensions accepted when the caller does not supply an allowlist
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "java", "c", "h", "cpp", "cc", "cxx", "hpp",
    "hxx", "cs", "go", "rs", "php", "rb", "swift", "kt", "kts", "scala", "m", "mm", "md",
    "markdown",
];

/// Ignore patterns always in effect; caller patterns append, never replace
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // VCS
    ".git/",
    ".svn/",
    ".hg/",
    // Build outputs
    "target/",
    "dist/",
    "build/",
    "out/",
    "bin/",
    "obj/",
    // Package caches and environments
    "node_modules/",
    "__pycache__/",
    ".venv/",
    "venv/",
    "vendor/",
    ".gradle/",
    ".idea/",
    ".vscode/",
    // Lockfiles
    "*.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    // Bundled or generated artifacts
    "*.min.js",
    "*.min.css",
    "*.map",
    "*.bundle.js",
    // Binary blobs that sometimes carry source extensions
    "*.so",
    "*.dylib",
    "*.dll",
    "*.a",
    "*.o",
    "*.class",
    "*.jar",
    "*.war",
    "*.pyc",
    "*.wasm",
];

/// A file discovered by the walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Path relative to the root, forward-slash separated
    pub relative_path: String,
}

/// Gitignore-style matcher over relative paths.
///
/// `**` crosses directories, `*` stays within a segment, a trailing `/`
/// makes the pattern directory-only. Patterns without a `/` match at any
/// depth; patterns containing one are anchored at the root.
pub struct IgnoreMatcher {
    set: GlobSet,
}

impl IgnoreMatcher {
    pub fn new(patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            for glob in Self::expand(pattern) {
                match Glob::new(&glob) {
                    Ok(g) => {
                        builder.add(g);
                    }
                    Err(e) => {
                        tracing::warn!("Skipping invalid ignore pattern '{}': {}", pattern, e);
                    }
                }
            }
        }
        let set = builder.build().unwrap_or_else(|e| {
            tracing::warn!("Failed to build ignore set, ignoring patterns: {}", e);
            GlobSet::empty()
        });
        Self { set }
    }

    /// Expand one gitignore-style pattern into the globset globs that
    /// implement its matching semantics.
    fn expand(pattern: &str) -> Vec<String> {
        let (body, dir_only) = match pattern.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (pattern, false),
        };
        if body.is_empty() {
            return Vec::new();
        }

        let anchored = body.contains('/');
        let mut globs = Vec::new();
        if anchored {
            globs.push(body.to_string());
            if dir_only {
                globs.push(format!("{}/**", body));
            }
        } else {
            globs.push(body.to_string());
            globs.push(format!("**/{}", body));
            if dir_only {
                globs.push(format!("{}/**", body));
                globs.push(format!("**/{}/**", body));
            }
        }
        globs
    }

    pub fn is_ignored(&self, relative_path: &str) -> bool {
        self.set.is_match(relative_path)
    }
}

/// Enumerates files under a root honouring extension and ignore rules.
///
/// Output order is deterministic: depth-first, lexicographic per
/// directory. Symbolic links are followed; cycles are detected by the
/// underlying walker and skipped.
pub struct FileWalker {
    root: PathBuf,
    allowed_extensions: Vec<String>,
    ignore: IgnoreMatcher,
    max_file_size: u64,
}

impl FileWalker {
    /// Build a walker for `root`.
    ///
    /// `allowed_extensions` may be given with or without a leading dot;
    /// empty means [`DEFAULT_EXTENSIONS`]. `extra_ignore_patterns` are
    /// appended to [`DEFAULT_IGNORE_PATTERNS`].
    pub fn new(
        root: impl AsRef<Path>,
        allowed_extensions: &[String],
        extra_ignore_patterns: &[String],
        max_file_size: u64,
    ) -> Self {
        let allowed: Vec<String> = if allowed_extensions.is_empty() {
            DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
        } else {
            allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect()
        };

        let mut patterns: Vec<String> = DEFAULT_IGNORE_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .collect();
        patterns.extend(extra_ignore_patterns.iter().cloned());

        Self {
            root: root.as_ref().to_path_buf(),
            allowed_extensions: allowed,
            ignore: IgnoreMatcher::new(&patterns),
            max_file_size,
        }
    }

    /// Walk the directory and collect eligible files in deterministic order
    pub fn walk(&self) -> Result<Vec<WalkedFile>> {
        if !self.root.is_dir() {
            return Err(Error::PathNotFound(self.root.display().to_string()));
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .hidden(false)
            .follow_links(true)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // Loop errors from followed symlinks land here too
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let relative_path = crate::paths::relative_slash_path(&self.root, path);

            if self.ignore.is_ignored(&relative_path) {
                tracing::debug!("Ignoring {}", relative_path);
                continue;
            }

            // Extensions outside the allowed set are skipped silently
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            match extension {
                Some(ext) if self.allowed_extensions.iter().any(|a| a == &ext) => {}
                _ => continue,
            }

            match entry.metadata() {
                Ok(metadata) if metadata.len() > self.max_file_size => {
                    tracing::warn!(
                        "Skipping {} ({} bytes exceeds cap of {})",
                        relative_path,
                        metadata.len(),
                        self.max_file_size
                    );
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Skipping {}: cannot stat: {}", relative_path, e);
                    continue;
                }
            }

            files.push(WalkedFile {
                absolute_path: path.to_path_buf(),
                relative_path,
            });
        }

        tracing::debug!("Walker found {} files under {:?}", files.len(), self.root);
        Ok(files)
    }
}
