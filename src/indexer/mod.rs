//! Indexing orchestration
//!
//! Drives full and incremental indexing: walks the tree, chunks files on
//! the worker pool, trains the BM25 model over the complete corpus,
//! embeds in batches through a bounded pipeline, inserts into the vector
//! store, persists the snapshot, and maintains the status registry
//! through every transition.

use crate::bm25::{Bm25Model, Bm25Store, GenerateOptions};
use crate::changes::ChangeDetector;
use crate::chunker::{Chunker, SplitStrategy};
use crate::config::IndexingConfig;
use crate::embedding::{embed_batch_with_fallback, EmbeddingClient};
use crate::error::{Error, Result, StoreError};
use crate::paths::{canonical_root, collection_name, content_hash};
use crate::snapshot::SnapshotStore;
use crate::status::{CodebaseStatus, IndexOutcome, StatusRegistry};
use crate::store::{FilterExpr, VectorDocument, VectorStore};
use crate::walker::FileWalker;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Upper bound on ids fetched when deleting a file's chunks
const DELETE_QUERY_LIMIT: usize = 10_000;

/// Upper bound on documents scanned to rebuild the hybrid corpus
const CORPUS_QUERY_LIMIT: usize = 100_000;

/// Options for [`Indexer::index_codebase`]
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Drop and recreate an existing collection
    pub force: bool,
    pub splitter: SplitStrategy,
    /// Override the default extension allowlist
    pub allowed_extensions: Option<Vec<String>>,
    /// Appended to the built-in ignore patterns
    pub ignore_patterns: Option<Vec<String>>,
}

/// Result of a full indexing run
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub indexed_files: u64,
    pub total_chunks: u64,
    pub status: IndexOutcome,
    pub duration_ms: u64,
    /// Non-fatal per-chunk/per-file failures
    pub errors: Vec<String>,
}

/// Result of an incremental run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReindexStats {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub duration_ms: u64,
}

/// Result of clearing a codebase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearStats {
    pub cleared: bool,
    pub remaining_indexed_codebases: u32,
}

/// One progress report
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub phase: String,
    pub processed: usize,
    pub total: usize,
    pub percentage: f32,
}

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// A chunk waiting for embedding and insertion
struct PendingChunk {
    id: String,
    content: String,
    relative_path: String,
    start_line: i64,
    end_line: i64,
    file_extension: String,
    metadata: String,
}

/// Per-file chunking outcome
struct FileOutcome {
    relative_path: String,
    hash: String,
    chunks: Vec<crate::chunker::Chunk>,
}

/// Orchestrates indexing for any number of codebases
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    snapshots: Arc<SnapshotStore>,
    registry: Arc<StatusRegistry>,
    bm25: Arc<Bm25Store>,
    config: IndexingConfig,
    pool: Arc<rayon::ThreadPool>,
    /// Single writer per canonical root within this process
    root_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        snapshots: Arc<SnapshotStore>,
        registry: Arc<StatusRegistry>,
        bm25: Arc<Bm25Store>,
        config: IndexingConfig,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get().min(8))
            .thread_name(|i| format!("codescout-worker-{i}"))
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

        Ok(Self {
            store,
            embedder,
            snapshots,
            registry,
            bm25,
            config,
            pool: Arc::new(pool),
            root_locks: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    async fn lock_for(&self, root_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.root_locks
            .lock()
            .await
            .entry(root_key.to_string())
            .or_default()
            .clone()
    }

    /// Index a codebase from scratch.
    ///
    /// Fails with `AlreadyIndexed` when a live collection exists and
    /// `force` is false; with `force`, the collection is dropped first.
    pub async fn index_codebase(
        &self,
        root: impl AsRef<Path>,
        options: IndexOptions,
        progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<IndexStats> {
        let root = canonical_root(root)?;
        let root_key = root.to_string_lossy().into_owned();
        let collection = collection_name(&root);

        if self.registry.is_indexing(&root_key) {
            return Err(Error::AlreadyIndexing(root.display().to_string()));
        }
        let lock = self.lock_for(&root_key).await;
        let _guard = lock.lock().await;

        if self.store.has_collection(&collection).await? {
            if !options.force {
                return Err(Error::AlreadyIndexed(root.display().to_string()));
            }
            tracing::info!("Force re-index: dropping collection {}", collection);
            self.store.drop_collection(&collection).await?;
            self.bm25.remove(&collection);
        }

        self.registry.set_indexing(&root_key);

        let result = self
            .run_full_index(&root, &root_key, &collection, &options, progress.as_ref(), &cancel)
            .await;

        match result {
            Ok(stats) => Ok(stats),
            Err(error) => {
                let last_pct = match self.registry.get(&root_key) {
                    Some(CodebaseStatus::Indexing { progress }) => progress,
                    _ => 0.0,
                };
                let message = match &error {
                    Error::Cancelled => "cancelled".to_string(),
                    other => other.to_string(),
                };
                self.registry.set_failed(&root_key, &message, last_pct);
                Err(error)
            }
        }
    }

    async fn run_full_index(
        &self,
        root: &Path,
        root_key: &str,
        collection: &str,
        options: &IndexOptions,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<IndexStats> {
        let started = Instant::now();
        let mut errors: Vec<String> = Vec::new();

        // Enumerate
        let allowed = options.allowed_extensions.clone().unwrap_or_default();
        let ignore = options.ignore_patterns.clone().unwrap_or_default();
        let walker = FileWalker::new(root, &allowed, &ignore, self.config.max_file_size);
        let files = tokio::task::spawn_blocking(move || walker.walk())
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))??;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Chunk on the worker pool
        let chunker = Chunker::new(
            options.splitter,
            self.config.max_chunk_chars,
            self.config.min_chunk_chars,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )?;
        let pool = Arc::clone(&self.pool);
        let outcomes: Vec<Option<FileOutcome>> = tokio::task::spawn_blocking(move || {
            pool.install(|| {
                files
                    .par_iter()
                    .map(|file| chunk_one_file(&chunker, &file.absolute_path, &file.relative_path))
                    .collect()
            })
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut pending: Vec<PendingChunk> = Vec::new();
        let mut processed_files: Vec<(String, String)> = Vec::new();
        let mut file_chunk_end: Vec<usize> = Vec::new();
        for outcome in outcomes.into_iter().flatten() {
            for chunk in &outcome.chunks {
                pending.push(pending_chunk(&outcome, chunk));
            }
            file_chunk_end.push(pending.len());
            processed_files.push((outcome.relative_path, outcome.hash));
        }
        let total_chunks = pending.len();
        tracing::info!(
            "Indexing {}: {} files, {} chunks",
            root_key,
            processed_files.len(),
            total_chunks
        );

        // Near-capacity backends terminate cleanly before any work
        if !self.store.check_collection_limit().await? {
            tracing::warn!("Vector store near capacity, not indexing {}", root_key);
            self.snapshots.save(root, &BTreeMap::new())?;
            self.registry
                .set_indexed(root_key, 0, 0, IndexOutcome::LimitReached);
            return Ok(IndexStats {
                indexed_files: 0,
                total_chunks: 0,
                status: IndexOutcome::LimitReached,
                duration_ms: started.elapsed().as_millis() as u64,
                errors,
            });
        }

        // Create the collection, probing the provider for its dimension
        // when configuration does not pin one
        let dimension = match self.embedder.dimension() {
            Some(dimension) => dimension,
            None => self.embedder.embed(" ").await.map_err(Error::from)?.len(),
        };
        let hybrid = self.store.supports_hybrid();
        let creation = if hybrid {
            self.store
                .create_hybrid_collection(collection, dimension)
                .await
        } else {
            self.store.create_collection(collection, dimension).await
        };
        let mut limit_reached = match creation {
            Ok(()) => false,
            Err(StoreError::CollectionLimitReached(reason)) => {
                tracing::warn!("Collection limit reached creating {}: {}", collection, reason);
                true
            }
            Err(e) => return Err(e.into()),
        };

        // Embed and insert through the bounded pipeline
        let mut inserted_chunks = 0usize;
        let mut chunk_cursor = 0usize;
        if !limit_reached && total_chunks > 0 {
            let outcome = self
                .run_pipeline(
                    collection,
                    root_key,
                    pending,
                    total_chunks,
                    hybrid,
                    progress,
                    cancel,
                )
                .await?;
            inserted_chunks = outcome.inserted_chunks;
            chunk_cursor = outcome.chunk_cursor;
            limit_reached = outcome.limit_reached;
            errors.extend(outcome.errors);
        } else if total_chunks == 0 {
            emit_progress(progress, "indexing", 0, 0, 100.0);
        }

        // Snapshot covers every successfully processed file; on a
        // limit-reached stop only files fully inserted count
        let completed: Vec<&(String, String)> = if limit_reached {
            processed_files
                .iter()
                .zip(&file_chunk_end)
                .filter(|(_, &end)| end <= chunk_cursor)
                .map(|(file, _)| file)
                .collect()
        } else {
            processed_files.iter().collect()
        };
        let snapshot: BTreeMap<String, String> = completed
            .iter()
            .map(|(path, hash)| (path.clone(), hash.clone()))
            .collect();
        self.snapshots.save(root, &snapshot)?;

        let status = if limit_reached {
            IndexOutcome::LimitReached
        } else {
            IndexOutcome::Completed
        };
        self.registry.set_indexed(
            root_key,
            completed.len() as u64,
            inserted_chunks as u64,
            status,
        );

        Ok(IndexStats {
            indexed_files: completed.len() as u64,
            total_chunks: inserted_chunks as u64,
            status,
            duration_ms: started.elapsed().as_millis() as u64,
            errors,
        })
    }

    /// Bounded embed→insert pipeline: at most two embedding batches and
    /// two insert batches in flight
    async fn run_pipeline(
        &self,
        collection: &str,
        root_key: &str,
        pending: Vec<PendingChunk>,
        total_chunks: usize,
        hybrid: bool,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome> {
        let embed_batch = self.config.embed_batch.max(1);
        let insert_batch = self.config.insert_batch.max(1);

        // One training pass over the complete corpus before any insert:
        // every document's sparse vector must index into the same
        // vocabulary as the model queries run against
        let model = if hybrid {
            let mut model = Bm25Model::new();
            model.learn(pending.iter().map(|c| c.content.as_str()))?;
            self.bm25.put(collection, model.clone())?;
            Some(model)
        } else {
            None
        };

        let (tx, mut rx) = tokio::sync::mpsc::channel::<EmbeddedBatch>(2);
        let embedder = Arc::clone(&self.embedder);
        let embed_cancel = cancel.clone();

        let embed_task = tokio::spawn(async move {
            let mut cursor = 0usize;
            for batch in pending.chunks(embed_batch) {
                if embed_cancel.is_cancelled() {
                    return Ok(());
                }
                cursor += batch.len();

                let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
                let embedded = embed_batch_with_fallback(embedder.as_ref(), &texts).await?;

                let mut docs = Vec::with_capacity(batch.len());
                let mut errors = Vec::new();
                for (chunk, vector) in batch.iter().zip(embedded) {
                    match vector {
                        Some(dense_vector) => docs.push(VectorDocument {
                            id: chunk.id.clone(),
                            dense_vector,
                            sparse_vector: None,
                            content: chunk.content.clone(),
                            relative_path: chunk.relative_path.clone(),
                            start_line: chunk.start_line,
                            end_line: chunk.end_line,
                            file_extension: chunk.file_extension.clone(),
                            metadata: chunk.metadata.clone(),
                        }),
                        None => errors.push(format!(
                            "skipped chunk {}:{}-{} after embedding failure",
                            chunk.relative_path, chunk.start_line, chunk.end_line
                        )),
                    }
                }

                if tx
                    .send(EmbeddedBatch {
                        docs,
                        cursor,
                        errors,
                    })
                    .await
                    .is_err()
                {
                    // Receiver gone: insertion stopped early
                    return Ok(());
                }
            }
            Ok::<(), crate::error::EmbeddingError>(())
        });

        let mut outcome = PipelineOutcome::default();
        let mut buffer: Vec<VectorDocument> = Vec::new();
        let mut buffered_cursor = 0usize;
        let mut cancelled = false;

        'recv: while let Some(batch) = rx.recv().await {
            outcome.errors.extend(batch.errors);
            buffer.extend(batch.docs);
            buffered_cursor = batch.cursor;

            while buffer.len() >= insert_batch {
                let slice: Vec<VectorDocument> = buffer.drain(..insert_batch).collect();
                let advance = if buffer.is_empty() { buffered_cursor } else { 0 };
                if !self
                    .insert_slice(
                        collection,
                        root_key,
                        slice,
                        model.as_ref(),
                        total_chunks,
                        advance,
                        &mut outcome,
                        progress,
                    )
                    .await?
                {
                    break 'recv;
                }
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'recv;
                }
            }
        }

        // Close the channel so the embedder can finish, then drain the tail
        drop(rx);

        if !outcome.limit_reached && !cancelled && !buffer.is_empty() {
            let slice: Vec<VectorDocument> = std::mem::take(&mut buffer);
            self.insert_slice(
                collection,
                root_key,
                slice,
                model.as_ref(),
                total_chunks,
                buffered_cursor,
                &mut outcome,
                progress,
            )
            .await?;
        }

        // Await in-flight embedding work before returning
        match embed_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => return Err(Error::Io(std::io::Error::other(e.to_string()))),
        }

        if cancelled || cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Progress completes even when trailing chunks were skipped
        if !outcome.limit_reached {
            outcome.chunk_cursor = total_chunks;
            emit_progress(progress, "indexing", total_chunks, total_chunks, 100.0);
            self.registry.set_progress(root_key, 100.0);
        }

        Ok(outcome)
    }

    /// Insert one batch; returns false when the run must stop cleanly
    #[allow(clippy::too_many_arguments)]
    async fn insert_slice(
        &self,
        collection: &str,
        root_key: &str,
        mut docs: Vec<VectorDocument>,
        model: Option<&Bm25Model>,
        total_chunks: usize,
        cursor_after: usize,
        outcome: &mut PipelineOutcome,
        progress: Option<&ProgressCallback>,
    ) -> Result<bool> {
        if !self.store.check_collection_limit().await? {
            tracing::warn!("Vector store near capacity, stopping indexing cleanly");
            outcome.limit_reached = true;
            return Ok(false);
        }

        let count = docs.len();
        let inserted = if let Some(model) = model {
            // Sparse vectors come from the run-wide model trained before
            // the pipeline started
            for doc in &mut docs {
                doc.sparse_vector =
                    Some(model.generate(&doc.content, &GenerateOptions::default())?);
            }
            self.store
                .insert_hybrid(collection, docs)
                .await
                .map(|()| count)
        } else {
            self.store.insert(collection, docs).await.map(|()| count)
        };

        match inserted {
            Ok(count) => {
                outcome.inserted_chunks += count;
                if cursor_after > 0 {
                    outcome.chunk_cursor = cursor_after;
                }
                let processed = outcome.chunk_cursor.max(outcome.inserted_chunks);
                let percentage = if total_chunks == 0 {
                    100.0
                } else {
                    100.0 * processed as f32 / total_chunks as f32
                };
                emit_progress(progress, "indexing", processed, total_chunks, percentage);
                self.registry.set_progress(root_key, percentage);
                Ok(true)
            }
            Err(StoreError::CollectionLimitReached(reason)) => {
                tracing::warn!("Collection limit reached mid-run: {}", reason);
                outcome.limit_reached = true;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-index only the files that changed since the last snapshot.
    ///
    /// Requires an existing collection. Deletions go first (removed, then
    /// modified), then added and modified files are chunked, embedded,
    /// and inserted; the fresh snapshot is persisted last.
    pub async fn reindex_by_change(
        &self,
        root: impl AsRef<Path>,
        progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<ReindexStats> {
        let started = Instant::now();
        let root = canonical_root(root)?;
        let root_key = root.to_string_lossy().into_owned();
        let collection = collection_name(&root);

        if self.registry.is_indexing(&root_key) {
            return Err(Error::AlreadyIndexing(root.display().to_string()));
        }
        let lock = self.lock_for(&root_key).await;
        let _guard = lock.lock().await;

        if !self.store.has_collection(&collection).await? {
            return Err(Error::NotIndexed(root.display().to_string()));
        }

        emit_progress(progress.as_ref(), "reindexing", 0, 100, 0.0);

        let detector = ChangeDetector::new(Arc::clone(&self.snapshots));
        let diff_root = root.clone();
        let max_file_size = self.config.max_file_size;
        let changes = tokio::task::spawn_blocking(move || {
            detector.diff(&diff_root, &[], &[], max_file_size)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))??;

        if changes.is_empty() {
            emit_progress(progress.as_ref(), "reindexing", 0, 0, 100.0);
            tracing::info!("No changes detected under {}", root_key);
            return Ok(ReindexStats {
                added: 0,
                modified: 0,
                removed: 0,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        let total = changes.total();
        let mut processed = 0usize;
        let report = |processed: usize| {
            let percentage = 100.0 * processed as f32 / total as f32;
            emit_progress(progress.as_ref(), "reindexing", processed, total, percentage);
        };

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Removed files: drop their vectors
        for path in &changes.removed {
            self.delete_file_chunks(&collection, path).await?;
            processed += 1;
            report(processed);
        }

        // Modified files: drop old vectors before re-inserting
        for path in &changes.modified {
            self.delete_file_chunks(&collection, path).await?;
        }

        // Added and modified files are indexed the same way
        let mut to_index: Vec<String> = changes
            .added
            .iter()
            .chain(changes.modified.iter())
            .cloned()
            .collect();
        to_index.sort();
        to_index.dedup();

        if !to_index.is_empty() {
            self.index_file_set(&collection, &root, &to_index, &cancel)
                .await?;
            processed += to_index.len();
            report(processed.min(total));
        }

        // Snapshot persists only after every downstream operation succeeded
        self.snapshots.save(&root, &changes.new_snapshot)?;
        emit_progress(progress.as_ref(), "reindexing", total, total, 100.0);

        tracing::info!(
            "Reindexed {}: +{} ~{} -{}",
            root_key,
            changes.added.len(),
            changes.modified.len(),
            changes.removed.len()
        );

        Ok(ReindexStats {
            added: changes.added.len(),
            modified: changes.modified.len(),
            removed: changes.removed.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Chunk, embed, and insert a fixed set of files
    async fn index_file_set(
        &self,
        collection: &str,
        root: &Path,
        relative_paths: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let chunker = Chunker::new(
            SplitStrategy::Ast,
            self.config.max_chunk_chars,
            self.config.min_chunk_chars,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )?;

        let jobs: Vec<(PathBuf, String)> = relative_paths
            .iter()
            .map(|rel| (root.join(rel), rel.clone()))
            .collect();
        let pool = Arc::clone(&self.pool);
        let outcomes: Vec<Option<FileOutcome>> = tokio::task::spawn_blocking(move || {
            pool.install(|| {
                jobs.par_iter()
                    .map(|(absolute, relative)| chunk_one_file(&chunker, absolute, relative))
                    .collect()
            })
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

        let mut pending: Vec<PendingChunk> = Vec::new();
        for outcome in outcomes.into_iter().flatten() {
            for chunk in &outcome.chunks {
                pending.push(pending_chunk(&outcome, chunk));
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        let hybrid = self.store.is_hybrid(collection).await?;

        // Retrain over every current document so IDF reflects the
        // post-update corpus. The vocabulary extends the previously
        // published model rather than rebuilding it: documents already in
        // the store keep sparse vectors that index into the same term
        // space, so only new terms gain indices
        let mut model = match self.bm25.get(collection) {
            Some(published) => (*published).clone(),
            None => Bm25Model::new(),
        };
        if hybrid {
            let mut corpus: Vec<String> = self
                .store
                .query(
                    collection,
                    "",
                    &[crate::store::fields::CONTENT.to_string()],
                    CORPUS_QUERY_LIMIT,
                )
                .await?
                .into_iter()
                .filter_map(|row| {
                    row.get(crate::store::fields::CONTENT)
                        .and_then(|v| v.as_str())
                        .map(String::from)
                })
                .collect();
            corpus.extend(pending.iter().map(|c| c.content.clone()));
            model.learn_preserving(corpus.iter())?;
            self.bm25.put(collection, model.clone())?;
        }

        for batch in pending.chunks(self.config.embed_batch.max(1)) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = embed_batch_with_fallback(self.embedder.as_ref(), &texts)
                .await
                .map_err(Error::from)?;

            let mut docs = Vec::with_capacity(batch.len());
            for (chunk, vector) in batch.iter().zip(embedded) {
                let Some(dense_vector) = vector else {
                    tracing::warn!(
                        "Skipping chunk {}:{}-{} after embedding failure",
                        chunk.relative_path,
                        chunk.start_line,
                        chunk.end_line
                    );
                    continue;
                };
                let sparse_vector = if hybrid {
                    Some(model.generate(&chunk.content, &GenerateOptions::default())?)
                } else {
                    None
                };
                docs.push(VectorDocument {
                    id: chunk.id.clone(),
                    dense_vector,
                    sparse_vector,
                    content: chunk.content.clone(),
                    relative_path: chunk.relative_path.clone(),
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    file_extension: chunk.file_extension.clone(),
                    metadata: chunk.metadata.clone(),
                });
            }

            if docs.is_empty() {
                continue;
            }
            if hybrid {
                self.store.insert_hybrid(collection, docs).await?;
            } else {
                self.store.insert(collection, docs).await?;
            }
        }

        Ok(())
    }

    /// Delete every vector whose relativePath matches.
    ///
    /// Backends that cannot delete (flat/FAISS-family) surface the
    /// limitation; the caller must drop and recreate the collection.
    async fn delete_file_chunks(&self, collection: &str, relative_path: &str) -> Result<()> {
        let filter = FilterExpr::eq(crate::store::fields::RELATIVE_PATH, relative_path);
        let rows = match self
            .store
            .query(collection, &filter, &["id".to_string()], DELETE_QUERY_LIMIT)
            .await
        {
            Ok(rows) => rows,
            Err(e @ StoreError::UnsupportedFilter(_)) => {
                tracing::error!(
                    "Backend cannot locate chunks of {} for deletion: {}. A full re-index (force) is required.",
                    relative_path,
                    e
                );
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let ids: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get("id").and_then(|v| v.as_str()).map(String::from))
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        match self.store.delete(collection, &ids).await {
            Ok(()) => Ok(()),
            Err(e @ StoreError::UnsupportedDeletion(_)) => {
                tracing::error!(
                    "Backend cannot delete chunks of {}: {}. A full re-index (force) is required.",
                    relative_path,
                    e
                );
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the collection, snapshot, BM25 model, and registry entry.
    /// Nothing here treats "already gone" as an error.
    pub async fn clear(&self, root: impl AsRef<Path>) -> Result<ClearStats> {
        let root = canonical_root(root)?;
        let root_key = root.to_string_lossy().into_owned();
        let collection = collection_name(&root);

        let lock = self.lock_for(&root_key).await;
        let _guard = lock.lock().await;

        let had_collection = self.store.has_collection(&collection).await?;
        if had_collection {
            self.store.drop_collection(&collection).await?;
        }
        let had_snapshot = self.snapshots.exists(&root);
        self.snapshots.delete(&root)?;
        self.bm25.remove(&collection);
        let had_status = self.registry.get(&root_key).is_some();
        self.registry.clear(&root_key);

        Ok(ClearStats {
            cleared: had_collection || had_snapshot || had_status,
            remaining_indexed_codebases: self.registry.count_indexed() as u32,
        })
    }

    /// Pure registry read; no store or snapshot access
    pub fn status(&self, root: impl AsRef<Path>) -> Option<CodebaseStatus> {
        let root = root.as_ref();
        let key = match root.canonicalize() {
            Ok(canonical) => canonical.to_string_lossy().into_owned(),
            Err(_) => root.to_string_lossy().into_owned(),
        };
        self.registry.get(&key)
    }

    /// All known codebases with their registry entries
    pub fn list_indexed(&self) -> Vec<(String, CodebaseStatus)> {
        self.registry.list()
    }
}

#[derive(Default)]
struct PipelineOutcome {
    inserted_chunks: usize,
    /// Highest chunk index known to be fully handled (inserted or skipped)
    chunk_cursor: usize,
    limit_reached: bool,
    errors: Vec<String>,
}

struct EmbeddedBatch {
    docs: Vec<VectorDocument>,
    /// Chunk index reached after this batch, including skipped items
    cursor: usize,
    errors: Vec<String>,
}

fn emit_progress(
    progress: Option<&ProgressCallback>,
    phase: &str,
    processed: usize,
    total: usize,
    percentage: f32,
) {
    if let Some(callback) = progress {
        callback(Progress {
            phase: phase.to_string(),
            processed,
            total,
            percentage: percentage.clamp(0.0, 100.0),
        });
    }
}

/// Read, hash, and chunk one file; unreadable or non-UTF-8 files are
/// skipped with a WARN
fn chunk_one_file(chunker: &Chunker, absolute: &Path, relative: &str) -> Option<FileOutcome> {
    let bytes = match std::fs::read(absolute) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Skipping unreadable file {}: {}", relative, e);
            return None;
        }
    };
    let hash = content_hash(&bytes);
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(_) => {
            tracing::warn!("Skipping non-UTF-8 file {}", relative);
            return None;
        }
    };

    let extension = Path::new(relative)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let chunks = chunker.chunk_file(&content, extension);

    Some(FileOutcome {
        relative_path: relative.to_string(),
        hash,
        chunks,
    })
}

fn pending_chunk(outcome: &FileOutcome, chunk: &crate::chunker::Chunk) -> PendingChunk {
    let file_extension = Path::new(&outcome.relative_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    let metadata = serde_json::json!({
        "language": chunk.language,
        "fileHash": outcome.hash,
        "nodeKind": chunk.node_kind,
    })
    .to_string();

    PendingChunk {
        id: VectorDocument::deterministic_id(
            &outcome.relative_path,
            chunk.start_line as i64,
            chunk.end_line as i64,
            &outcome.hash,
        ),
        content: chunk.content.clone(),
        relative_path: outcome.relative_path.clone(),
        start_line: chunk.start_line as i64,
        end_line: chunk.end_line as i64,
        file_extension,
        metadata,
    }
}
