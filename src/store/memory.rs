//! Embedded in-memory vector store
//!
//! Full-featured backend used as the zero-dependency default and by the
//! test suites: dense cosine search, sparse dot-product search,
//! client-side RRF fusion, filter evaluation, and deletion.

use super::{
    fields, DenseRequest, QueryRow, RetrievedDocument, SearchOptions, SparseRequest,
    VectorDocument, VectorStore,
};
use crate::bm25::SparseVector;
use crate::error::StoreError;
use crate::search::reciprocal_rank_fusion;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug)]
struct Collection {
    dimension: usize,
    hybrid: bool,
    documents: Vec<VectorDocument>,
}

/// In-memory store; collections live for the lifetime of the value
#[derive(Debug)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    max_collections: Option<usize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            max_collections: None,
        }
    }

    /// Store that reports `check_collection_limit` false once it holds
    /// `max` collections
    pub fn with_collection_limit(max: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            max_collections: Some(max),
        }
    }

    async fn create(
        &self,
        name: &str,
        dimension: usize,
        hybrid: bool,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(StoreError::CollectionCreationFailed {
                collection: name.to_string(),
                reason: "already exists".to_string(),
            });
        }
        if let Some(max) = self.max_collections {
            if collections.len() >= max {
                return Err(StoreError::CollectionLimitReached(format!(
                    "{} collections (max {})",
                    collections.len(),
                    max
                )));
            }
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                hybrid,
                documents: Vec::new(),
            },
        );
        Ok(())
    }

    fn upsert(
        collection: &mut Collection,
        name: &str,
        documents: Vec<VectorDocument>,
        require_sparse: bool,
    ) -> Result<(), StoreError> {
        for doc in &documents {
            if doc.dense_vector.len() != collection.dimension {
                return Err(StoreError::InsertFailed(format!(
                    "dense vector has {} dimensions, collection '{}' expects {}",
                    doc.dense_vector.len(),
                    name,
                    collection.dimension
                )));
            }
            if require_sparse && doc.sparse_vector.is_none() {
                return Err(StoreError::InsertFailed(format!(
                    "document {} is missing its sparse vector for hybrid collection '{}'",
                    doc.id, name
                )));
            }
        }

        for doc in documents {
            collection.documents.retain(|existing| existing.id != doc.id);
            collection.documents.push(doc);
        }
        Ok(())
    }

    fn document_field(doc: &VectorDocument, field: &str) -> Option<String> {
        match field {
            "id" => Some(doc.id.clone()),
            fields::CONTENT => Some(doc.content.clone()),
            fields::RELATIVE_PATH => Some(doc.relative_path.clone()),
            fields::FILE_EXTENSION => Some(doc.file_extension.clone()),
            fields::METADATA => Some(doc.metadata.clone()),
            fields::START_LINE => Some(doc.start_line.to_string()),
            fields::END_LINE => Some(doc.end_line.to_string()),
            _ => None,
        }
    }

    fn apply_filter<'a>(
        documents: &'a [VectorDocument],
        filter: Option<&str>,
    ) -> Result<Vec<&'a VectorDocument>, StoreError> {
        match filter {
            None | Some("") => Ok(documents.iter().collect()),
            Some(expr) => {
                let parsed = super::FilterExpr::parse(expr)?;
                Ok(documents
                    .iter()
                    .filter(|doc| parsed.matches(|field| Self::document_field(doc, field)))
                    .collect())
            }
        }
    }

    fn to_retrieved(doc: &VectorDocument, score: f32) -> RetrievedDocument {
        RetrievedDocument {
            id: doc.id.clone(),
            content: doc.content.clone(),
            relative_path: doc.relative_path.clone(),
            start_line: doc.start_line,
            end_line: doc.end_line,
            file_extension: doc.file_extension.clone(),
            metadata: doc.metadata.clone(),
            score,
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f32 {
    let mut dot = 0.0;
    let mut i = 0;
    let mut j = 0;
    while i < a.indices.len() && j < b.indices.len() {
        match a.indices[i].cmp(&b.indices[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a.values[i] * b.values[j];
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), StoreError> {
        self.create(name, dimension, false).await
    }

    async fn create_hybrid_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<(), StoreError> {
        self.create(name, dimension, true).await
    }

    async fn drop_collection(&self, name: &str) -> Result<(), StoreError> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn is_hybrid(&self, name: &str) -> Result<bool, StoreError> {
        self.collections
            .read()
            .await
            .get(name)
            .map(|c| c.hybrid)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    async fn insert(&self, name: &str, documents: Vec<VectorDocument>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        Self::upsert(collection, name, documents, false)
    }

    async fn insert_hybrid(
        &self,
        name: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        if !collection.hybrid {
            return Err(StoreError::InsertFailed(format!(
                "collection '{name}' is dense-only"
            )));
        }
        Self::upsert(collection, name, documents, true)
    }

    async fn search(
        &self,
        name: &str,
        dense: DenseRequest,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>, StoreError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        let candidates = Self::apply_filter(&collection.documents, options.filter.as_deref())?;

        let mut scored: Vec<(f32, &VectorDocument)> = candidates
            .into_iter()
            .map(|doc| (cosine_similarity(&dense.vector, &doc.dense_vector), doc))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(dense.limit.min(options.limit));

        Ok(scored
            .into_iter()
            .map(|(score, doc)| Self::to_retrieved(doc, score))
            .collect())
    }

    async fn hybrid_search(
        &self,
        name: &str,
        dense: DenseRequest,
        sparse: SparseRequest,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>, StoreError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        let candidates = Self::apply_filter(&collection.documents, options.filter.as_deref())?;

        // Dense branch
        let mut dense_ranked: Vec<(f32, &VectorDocument)> = candidates
            .iter()
            .map(|doc| (cosine_similarity(&dense.vector, &doc.dense_vector), *doc))
            .collect();
        dense_ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        dense_ranked.truncate(dense.limit);

        // Sparse branch: only documents with a matching term contribute
        let mut sparse_ranked: Vec<(f32, &VectorDocument)> = candidates
            .iter()
            .filter_map(|doc| {
                let vector = doc.sparse_vector.as_ref()?;
                let score = sparse_dot(&sparse.vector, vector);
                (score > 0.0).then_some((score, *doc))
            })
            .collect();
        sparse_ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        sparse_ranked.truncate(sparse.limit);

        let dense_ids: Vec<String> = dense_ranked.iter().map(|(_, d)| d.id.clone()).collect();
        let sparse_ids: Vec<String> = sparse_ranked.iter().map(|(_, d)| d.id.clone()).collect();

        let fused = reciprocal_rank_fusion(&dense_ids, &sparse_ids, options.rrf_k);

        let by_id: HashMap<&str, &VectorDocument> =
            candidates.iter().map(|doc| (doc.id.as_str(), *doc)).collect();

        Ok(fused
            .into_iter()
            .take(options.limit)
            .filter_map(|(id, score)| {
                by_id
                    .get(id.as_str())
                    .map(|doc| Self::to_retrieved(doc, score))
            })
            .collect())
    }

    async fn query(
        &self,
        name: &str,
        filter_expr: &str,
        output_fields: &[String],
        limit: usize,
    ) -> Result<Vec<QueryRow>, StoreError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        let filter = if filter_expr.is_empty() {
            None
        } else {
            Some(filter_expr)
        };
        let matched = Self::apply_filter(&collection.documents, filter)?;

        let rows = matched
            .into_iter()
            .take(limit)
            .map(|doc| {
                let mut row = QueryRow::new();
                let wanted: Vec<&str> = if output_fields.is_empty() {
                    vec![
                        "id",
                        fields::CONTENT,
                        fields::RELATIVE_PATH,
                        fields::START_LINE,
                        fields::END_LINE,
                        fields::FILE_EXTENSION,
                        fields::METADATA,
                    ]
                } else {
                    let mut w: Vec<&str> = output_fields.iter().map(String::as_str).collect();
                    if !w.contains(&"id") {
                        w.push("id");
                    }
                    w
                };
                for field in wanted {
                    match field {
                        fields::START_LINE => {
                            row.insert(field.to_string(), doc.start_line.into());
                        }
                        fields::END_LINE => {
                            row.insert(field.to_string(), doc.end_line.into());
                        }
                        _ => {
                            if let Some(value) = Self::document_field(doc, field) {
                                row.insert(field.to_string(), value.into());
                            }
                        }
                    }
                }
                row
            })
            .collect();

        Ok(rows)
    }

    async fn delete(&self, name: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        collection
            .documents
            .retain(|doc| !ids.contains(&doc.id));
        Ok(())
    }

    async fn check_collection_limit(&self) -> Result<bool, StoreError> {
        match self.max_collections {
            Some(max) => Ok(self.collections.read().await.len() < max),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, path: &str, dense: Vec<f32>, sparse: Option<SparseVector>) -> VectorDocument {
        VectorDocument {
            id: id.to_string(),
            dense_vector: dense,
            sparse_vector: sparse,
            content: format!("content of {id}"),
            relative_path: path.to_string(),
            start_line: 1,
            end_line: 5,
            file_extension: ".rs".to_string(),
            metadata: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_insert_search() {
        let store = MemoryStore::new();
        store.create_collection("c", 2).await.unwrap();

        store
            .insert(
                "c",
                vec![
                    doc("a", "a.rs", vec![1.0, 0.0], None),
                    doc("b", "b.rs", vec![0.0, 1.0], None),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search(
                "c",
                DenseRequest {
                    vector: vec![1.0, 0.1],
                    limit: 10,
                },
                &SearchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(results[0].id, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = MemoryStore::new();
        store.create_collection("c", 3).await.unwrap();
        let err = store
            .insert("c", vec![doc("a", "a.rs", vec![1.0, 0.0], None)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsertFailed(_)));
    }

    #[tokio::test]
    async fn test_hybrid_insert_requires_sparse() {
        let store = MemoryStore::new();
        store.create_hybrid_collection("c", 2).await.unwrap();
        let err = store
            .insert_hybrid("c", vec![doc("a", "a.rs", vec![1.0, 0.0], None)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsertFailed(_)));
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = MemoryStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .insert("c", vec![doc("a", "a.rs", vec![1.0, 0.0], None)])
            .await
            .unwrap();
        store
            .insert("c", vec![doc("a", "a2.rs", vec![0.0, 1.0], None)])
            .await
            .unwrap();

        let rows = store.query("c", "", &[], 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["relativePath"], "a2.rs");
    }

    #[tokio::test]
    async fn test_hybrid_search_fuses_branches() {
        let store = MemoryStore::new();
        store.create_hybrid_collection("c", 2).await.unwrap();

        let sparse_hit = SparseVector {
            indices: vec![3, 7],
            values: vec![0.9, 0.4],
        };
        let sparse_miss = SparseVector {
            indices: vec![12],
            values: vec![0.5],
        };

        store
            .insert_hybrid(
                "c",
                vec![
                    // Strong dense, no sparse overlap
                    doc("dense_doc", "d.rs", vec![1.0, 0.0], Some(sparse_miss)),
                    // Weak dense, strong sparse overlap
                    doc("sparse_doc", "s.rs", vec![0.0, 1.0], Some(sparse_hit)),
                ],
            )
            .await
            .unwrap();

        let results = store
            .hybrid_search(
                "c",
                DenseRequest {
                    vector: vec![1.0, 0.05],
                    limit: 10,
                },
                SparseRequest {
                    vector: SparseVector {
                        indices: vec![3],
                        values: vec![1.0],
                    },
                    limit: 10,
                },
                &SearchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        // Both docs contribute from one branch each; the dense winner also
        // ranks second in no list, so fused scores are close but ordered
        // deterministically
        assert!(results.iter().any(|r| r.id == "dense_doc"));
        assert!(results.iter().any(|r| r.id == "sparse_doc"));
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_query_filter_and_delete() {
        let store = MemoryStore::new();
        store.create_collection("c", 1).await.unwrap();
        store
            .insert(
                "c",
                vec![
                    doc("a", "x/a.rs", vec![1.0], None),
                    doc("b", "x/b.rs", vec![1.0], None),
                ],
            )
            .await
            .unwrap();

        let rows = store
            .query("c", "relativePath == 'x/a.rs'", &[], 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "a");

        store.delete("c", &["a".to_string()]).await.unwrap();
        let rows = store
            .query("c", "relativePath == 'x/a.rs'", &[], 10)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_collection_limit() {
        let store = MemoryStore::with_collection_limit(1);
        assert!(store.check_collection_limit().await.unwrap());
        store.create_collection("one", 2).await.unwrap();
        assert!(!store.check_collection_limit().await.unwrap());
        let err = store.create_collection("two", 2).await.unwrap_err();
        assert!(matches!(err, StoreError::CollectionLimitReached(_)));
    }

    #[tokio::test]
    async fn test_drop_missing_collection_is_ok() {
        let store = MemoryStore::new();
        store.drop_collection("ghost").await.unwrap();
        assert!(!store.has_collection("ghost").await.unwrap());
    }
}
