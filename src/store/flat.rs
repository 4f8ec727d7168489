//! Flat embedded store with FAISS-family semantics
//!
//! Append-only dense index: deletion and non-trivial query filters are
//! not supported and are surfaced as errors rather than emulated. The
//! engine reacts by requiring a drop-and-recreate cycle for updates.

use super::{
    fields, DenseRequest, QueryRow, RetrievedDocument, SearchOptions, SparseRequest,
    VectorDocument, VectorStore,
};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug)]
struct Collection {
    dimension: usize,
    documents: Vec<VectorDocument>,
}

/// Dense-only, append-only store
#[derive(Debug)]
pub struct FlatStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl Default for FlatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
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

#[async_trait]
impl VectorStore for FlatStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(StoreError::CollectionCreationFailed {
                collection: name.to_string(),
                reason: "already exists".to_string(),
            });
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                documents: Vec::new(),
            },
        );
        Ok(())
    }

    async fn create_hybrid_collection(
        &self,
        name: &str,
        _dimension: usize,
    ) -> Result<(), StoreError> {
        Err(StoreError::CollectionCreationFailed {
            collection: name.to_string(),
            reason: "flat backend is dense-only".to_string(),
        })
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
        if self.collections.read().await.contains_key(name) {
            Ok(false)
        } else {
            Err(StoreError::CollectionNotFound(name.to_string()))
        }
    }

    fn supports_hybrid(&self) -> bool {
        false
    }

    async fn insert(&self, name: &str, documents: Vec<VectorDocument>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        for doc in &documents {
            if doc.dense_vector.len() != collection.dimension {
                return Err(StoreError::InsertFailed(format!(
                    "dense vector has {} dimensions, collection '{}' expects {}",
                    doc.dense_vector.len(),
                    name,
                    collection.dimension
                )));
            }
        }
        collection.documents.extend(documents);
        Ok(())
    }

    async fn insert_hybrid(
        &self,
        name: &str,
        _documents: Vec<VectorDocument>,
    ) -> Result<(), StoreError> {
        Err(StoreError::InsertFailed(format!(
            "flat backend collection '{name}' cannot hold sparse vectors"
        )))
    }

    async fn search(
        &self,
        name: &str,
        dense: DenseRequest,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>, StoreError> {
        if options.filter.as_deref().is_some_and(|f| !f.is_empty()) {
            return Err(StoreError::UnsupportedFilter(
                "flat backend cannot filter searches".to_string(),
            ));
        }

        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        let mut scored: Vec<(f32, &VectorDocument)> = collection
            .documents
            .iter()
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
            .map(|(score, doc)| RetrievedDocument {
                id: doc.id.clone(),
                content: doc.content.clone(),
                relative_path: doc.relative_path.clone(),
                start_line: doc.start_line,
                end_line: doc.end_line,
                file_extension: doc.file_extension.clone(),
                metadata: doc.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn hybrid_search(
        &self,
        _name: &str,
        _dense: DenseRequest,
        _sparse: SparseRequest,
        _options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>, StoreError> {
        Err(StoreError::SearchFailed(
            "flat backend does not support hybrid search".to_string(),
        ))
    }

    async fn query(
        &self,
        name: &str,
        filter_expr: &str,
        output_fields: &[String],
        limit: usize,
    ) -> Result<Vec<QueryRow>, StoreError> {
        if !filter_expr.is_empty() {
            return Err(StoreError::UnsupportedFilter(format!(
                "flat backend cannot evaluate '{filter_expr}'"
            )));
        }

        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        // Filterless listing up to the limit is the supported degradation
        let rows = collection
            .documents
            .iter()
            .take(limit)
            .map(|doc| {
                let mut row = QueryRow::new();
                row.insert("id".to_string(), doc.id.clone().into());
                if output_fields.is_empty()
                    || output_fields.iter().any(|f| f == fields::RELATIVE_PATH)
                {
                    row.insert(
                        fields::RELATIVE_PATH.to_string(),
                        doc.relative_path.clone().into(),
                    );
                }
                if output_fields.is_empty() || output_fields.iter().any(|f| f == fields::CONTENT) {
                    row.insert(fields::CONTENT.to_string(), doc.content.clone().into());
                }
                row
            })
            .collect();

        Ok(rows)
    }

    async fn delete(&self, name: &str, _ids: &[String]) -> Result<(), StoreError> {
        Err(StoreError::UnsupportedDeletion(format!(
            "flat backend collection '{name}' is append-only"
        )))
    }

    async fn check_collection_limit(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, dense: Vec<f32>) -> VectorDocument {
        VectorDocument {
            id: id.to_string(),
            dense_vector: dense,
            sparse_vector: None,
            content: "content".to_string(),
            relative_path: "a.rs".to_string(),
            start_line: 1,
            end_line: 2,
            file_extension: ".rs".to_string(),
            metadata: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_delete_is_unsupported() {
        let store = FlatStore::new();
        store.create_collection("c", 2).await.unwrap();
        let err = store.delete("c", &["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedDeletion(_)));
        assert!(err.to_string().contains("Drop and recreate"));
    }

    #[tokio::test]
    async fn test_nontrivial_filter_is_unsupported() {
        let store = FlatStore::new();
        store.create_collection("c", 2).await.unwrap();
        store.insert("c", vec![doc("a", vec![1.0, 0.0])]).await.unwrap();

        let err = store
            .query("c", "relativePath == 'a.rs'", &[], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedFilter(_)));

        // Filterless listing still works
        let rows = store.query("c", "", &[], 10).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_hybrid_is_rejected() {
        let store = FlatStore::new();
        assert!(!store.supports_hybrid());
        let err = store.create_hybrid_collection("c", 2).await.unwrap_err();
        assert!(matches!(err, StoreError::CollectionCreationFailed { .. }));
    }

    #[tokio::test]
    async fn test_dense_search_works() {
        let store = FlatStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .insert(
                "c",
                vec![doc("a", vec![1.0, 0.0]), doc("b", vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        let results = store
            .search(
                "c",
                DenseRequest {
                    vector: vec![0.9, 0.1],
                    limit: 1,
                },
                &SearchOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }
}
