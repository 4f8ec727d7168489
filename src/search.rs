//! Query-time hybrid retrieval
//!
//! Embeds the query, generates its sparse BM25 vector when the collection
//! is hybrid, runs both branches through the store, fuses with RRF, then
//! applies the threshold and extension filters and shapes the results.

use crate::bm25::{Bm25Store, GenerateOptions};
use crate::config::SearchConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{Error, Result};
use crate::paths::{canonical_root, collection_name};
use crate::status::StatusRegistry;
use crate::store::{DenseRequest, RetrievedDocument, SearchOptions, SparseRequest, VectorStore};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// One shaped search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub content: String,
    pub relative_path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub language: String,
    pub score: f32,
}

/// Search output plus the consistency flag for in-flight indexing
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// True when the codebase was still indexing at query time; results
    /// may be partial
    pub indexing_in_progress: bool,
}

/// Per-call knobs
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub limit: usize,
    /// Drop results whose fused score is below this, applied after fusion
    pub threshold: Option<f32>,
    /// Case-insensitive exact extensions, each starting with a dot
    pub extension_filter: Option<Vec<String>>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            limit: 10,
            threshold: None,
            extension_filter: None,
        }
    }
}

/// Reciprocal Rank Fusion over two ranked id lists.
///
/// `rrf(d) = Σ 1/(k + rank)` over the lists containing `d` (1-based
/// ranks). Ties break by higher dense rank first, then lexicographic id.
pub fn reciprocal_rank_fusion(
    dense_ids: &[String],
    sparse_ids: &[String],
    k: f32,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<&str, f32> = HashMap::new();
    let mut dense_rank: HashMap<&str, usize> = HashMap::new();

    for (rank, id) in dense_ids.iter().enumerate() {
        *scores.entry(id).or_insert(0.0) += 1.0 / (k + (rank + 1) as f32);
        dense_rank.insert(id, rank + 1);
    }
    for (rank, id) in sparse_ids.iter().enumerate() {
        *scores.entry(id).or_insert(0.0) += 1.0 / (k + (rank + 1) as f32);
    }

    let mut fused: Vec<(String, f32)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();

    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ra = dense_rank.get(a.0.as_str()).copied().unwrap_or(usize::MAX);
                let rb = dense_rank.get(b.0.as_str()).copied().unwrap_or(usize::MAX);
                ra.cmp(&rb)
            })
            .then_with(|| a.0.cmp(&b.0))
    });

    fused
}

/// Validate one extension filter entry: `^\.[A-Za-z0-9_+-]+$`
fn valid_extension(entry: &str) -> bool {
    let Some(rest) = entry.strip_prefix('.') else {
        return false;
    };
    !rest.is_empty()
        && rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-'))
}

/// Orchestrates query embedding, store retrieval, and result shaping
pub struct Searcher {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    registry: Arc<StatusRegistry>,
    bm25: Arc<Bm25Store>,
    config: SearchConfig,
    /// Collections already warned about missing BM25 models this process
    warned_untrained: Mutex<HashSet<String>>,
}

impl Searcher {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        registry: Arc<StatusRegistry>,
        bm25: Arc<Bm25Store>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            registry,
            bm25,
            config,
            warned_untrained: Mutex::new(HashSet::new()),
        }
    }

    pub async fn search(
        &self,
        root: impl AsRef<Path>,
        query: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        let root = canonical_root(root)?;
        let root_key = root.to_string_lossy().into_owned();
        let collection = collection_name(&root);

        // Searching while indexing is permitted; the store may return
        // partial results and the response is flagged accordingly
        let indexing_in_progress = self.registry.is_indexing(&root_key);
        if !self.registry.is_indexed(&root_key) && !indexing_in_progress {
            return Err(Error::NotIndexed(root.display().to_string()));
        }

        // Invalid filter entries fail the whole call before any search
        let extension_filter = match &request.extension_filter {
            Some(entries) => {
                let mut normalised = Vec::with_capacity(entries.len());
                for entry in entries {
                    if !valid_extension(entry) {
                        return Err(Error::InvalidExtensionFilter(entry.clone()));
                    }
                    normalised.push(entry.to_ascii_lowercase());
                }
                Some(normalised)
            }
            None => None,
        };

        let limit = request.limit.max(1);
        let prefetch = limit * 2;

        let dense_vector = self.embedder.embed(query).await.map_err(Error::from)?;
        let dense = DenseRequest {
            vector: dense_vector,
            limit: prefetch,
        };

        let options = SearchOptions {
            limit: prefetch,
            filter: None,
            rrf_k: self.config.rrf_k,
        };

        let hybrid = self.store.is_hybrid(&collection).await?;
        let retrieved = if hybrid {
            match self.sparse_query(&collection, query)? {
                Some(sparse_vector) => {
                    let sparse = SparseRequest {
                        vector: sparse_vector,
                        limit: prefetch,
                    };
                    let mut retrieved = self
                        .store
                        .hybrid_search(&collection, dense, sparse, &options)
                        .await?;
                    // Raw RRF scores top out at branches/(k+1); rescale so
                    // a perfect both-branch hit scores 1.0 and thresholds
                    // mean the same thing on every backend
                    let scale = (self.config.rrf_k + 1.0) / 2.0;
                    for doc in &mut retrieved {
                        doc.score *= scale;
                    }
                    retrieved
                }
                None => self.store.search(&collection, dense, &options).await?,
            }
        } else {
            self.store.search(&collection, dense, &options).await?
        };

        let mut results: Vec<SearchResult> = retrieved
            .into_iter()
            .filter(|doc| match request.threshold {
                Some(threshold) => doc.score >= threshold,
                None => true,
            })
            .filter(|doc| match &extension_filter {
                Some(extensions) => {
                    let ext = doc.file_extension.to_ascii_lowercase();
                    extensions.iter().any(|e| e == &ext)
                }
                None => true,
            })
            .map(shape_result)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });
        results.truncate(limit);

        Ok(SearchResponse {
            results,
            indexing_in_progress,
        })
    }

    /// Cancellable variant of [`Searcher::search`]: abandons in-flight
    /// provider and store calls when the token fires
    pub async fn search_with_cancel(
        &self,
        root: impl AsRef<Path>,
        query: &str,
        request: &SearchRequest,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<SearchResponse> {
        tokio::select! {
            result = self.search(root, query, request) => result,
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }

    /// Sparse query vector, or None for the dense-only fallback
    fn sparse_query(
        &self,
        collection: &str,
        query: &str,
    ) -> Result<Option<crate::bm25::SparseVector>> {
        let Some(model) = self.bm25.get(collection) else {
            self.warn_untrained(collection);
            return Ok(None);
        };
        if !model.is_trained() {
            self.warn_untrained(collection);
            return Ok(None);
        }

        let vector = model.generate(
            query,
            &GenerateOptions {
                max_terms: Some(self.config.max_query_terms),
                normalize: true,
                ..Default::default()
            },
        )?;
        Ok(Some(vector))
    }

    fn warn_untrained(&self, collection: &str) {
        let mut warned = self
            .warned_untrained
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        if warned.insert(collection.to_string()) {
            tracing::warn!(
                "No trained BM25 model for {}, degrading to dense-only search",
                collection
            );
        }
    }
}

fn shape_result(doc: RetrievedDocument) -> SearchResult {
    let language = serde_json::from_str::<serde_json::Value>(&doc.metadata)
        .ok()
        .and_then(|meta| meta.get("language").and_then(|v| v.as_str()).map(String::from))
        .unwrap_or_default();

    SearchResult {
        content: doc.content,
        relative_path: doc.relative_path,
        start_line: doc.start_line,
        end_line: doc.end_line,
        language,
        score: doc.score,
    }
}
