//! Qdrant vector store adapter
//!
//! Dense collections use a single unnamed vector; hybrid collections use
//! a named dense vector plus a named sparse vector, with server-side RRF
//! fusion for hybrid search.

use super::{
    fields, DenseRequest, FilterExpr, QueryRow, RetrievedDocument, SearchOptions, SparseRequest,
    VectorDocument, VectorStore,
};
use crate::error::StoreError;
use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, Fusion,
    NamedVectors, PointId, PointStruct, PointsIdsList, PrefetchQueryBuilder, Query,
    QueryPointsBuilder, ScrollPointsBuilder, SearchPointsBuilder, SparseVectorParamsBuilder,
    SparseVectorsConfigBuilder, UpsertPointsBuilder, Value, Vector, VectorInput,
    VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::{Payload, Qdrant};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

const DENSE_VECTOR: &str = "dense";
const SPARSE_VECTOR: &str = "sparse";

pub struct QdrantStore {
    client: Qdrant,
    /// Hybrid flag per collection, filled on create and lazily on lookup
    hybrid_cache: RwLock<HashMap<String, bool>>,
    max_collections: Option<usize>,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("max_collections", &self.max_collections)
            .finish()
    }
}

impl QdrantStore {
    pub async fn connect(endpoint: &str, timeout_secs: u64) -> Result<Self, StoreError> {
        tracing::info!("Connecting to Qdrant at {}", endpoint);
        let client = Qdrant::from_url(endpoint)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            hybrid_cache: RwLock::new(HashMap::new()),
            max_collections: None,
        })
    }

    /// Cap the number of collections this client will report capacity for
    pub fn with_collection_cap(mut self, max: usize) -> Self {
        self.max_collections = Some(max);
        self
    }

    fn payload_for(doc: &VectorDocument) -> Result<Payload, StoreError> {
        Payload::try_from(serde_json::json!({
            fields::CONTENT: doc.content,
            fields::RELATIVE_PATH: doc.relative_path,
            fields::START_LINE: doc.start_line,
            fields::END_LINE: doc.end_line,
            fields::FILE_EXTENSION: doc.file_extension,
            fields::METADATA: doc.metadata,
        }))
        .map_err(|e| StoreError::InsertFailed(e.to_string()))
    }

    fn filter_for(expr: &str) -> Result<Filter, StoreError> {
        match FilterExpr::parse(expr)? {
            FilterExpr::Eq { field, value } => Ok(Filter::must([Condition::matches(field, value)])),
            FilterExpr::In { field, values } => Ok(Filter::should(
                values
                    .into_iter()
                    .map(|value| Condition::matches(field.clone(), value))
                    .collect::<Vec<_>>(),
            )),
        }
    }

    async fn collection_is_hybrid(&self, name: &str) -> Result<bool, StoreError> {
        if let Some(&hybrid) = self.hybrid_cache.read().await.get(name) {
            return Ok(hybrid);
        }

        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| StoreError::CollectionNotFound(format!("{name}: {e}")))?;

        let hybrid = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.sparse_vectors_config)
            .is_some();

        self.hybrid_cache
            .write()
            .await
            .insert(name.to_string(), hybrid);
        Ok(hybrid)
    }

    fn scored_to_retrieved(
        id: Option<PointId>,
        score: f32,
        payload: &HashMap<String, Value>,
    ) -> RetrievedDocument {
        RetrievedDocument {
            id: point_id_string(id),
            content: payload_str(payload, fields::CONTENT),
            relative_path: payload_str(payload, fields::RELATIVE_PATH),
            start_line: payload_i64(payload, fields::START_LINE),
            end_line: payload_i64(payload, fields::END_LINE),
            file_extension: payload_str(payload, fields::FILE_EXTENSION),
            metadata: payload_str(payload, fields::METADATA),
            score,
        }
    }
}

fn point_id_string(id: Option<PointId>) -> String {
    match id.and_then(|p| p.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> String {
    payload
        .get(key)
        .and_then(|v| match &v.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> i64 {
    payload
        .get(key)
        .and_then(|v| match &v.kind {
            Some(Kind::IntegerValue(i)) => Some(*i),
            Some(Kind::DoubleValue(d)) => Some(*d as i64),
            _ => None,
        })
        .unwrap_or_default()
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Value::from(d),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(fields)) => serde_json::Value::Object(
            fields
                .fields
                .into_iter()
                .map(|(k, v)| (k, value_to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), StoreError> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| StoreError::CollectionCreationFailed {
                collection: name.to_string(),
                reason: e.to_string(),
            })?;

        self.hybrid_cache
            .write()
            .await
            .insert(name.to_string(), false);
        Ok(())
    }

    async fn create_hybrid_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<(), StoreError> {
        let mut vectors = VectorsConfigBuilder::default();
        vectors.add_named_vector_params(
            DENSE_VECTOR,
            VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
        );

        let mut sparse = SparseVectorsConfigBuilder::default();
        sparse.add_named_vector_params(SPARSE_VECTOR, SparseVectorParamsBuilder::default());

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(vectors)
                    .sparse_vectors_config(sparse),
            )
            .await
            .map_err(|e| StoreError::CollectionCreationFailed {
                collection: name.to_string(),
                reason: e.to_string(),
            })?;

        self.hybrid_cache
            .write()
            .await
            .insert(name.to_string(), true);
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), StoreError> {
        if !self.has_collection(name).await? {
            return Ok(());
        }
        self.client
            .delete_collection(name)
            .await
            .map_err(|e| StoreError::DeleteFailed(format!("drop '{name}': {e}")))?;
        self.hybrid_cache.write().await.remove(name);
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        self.client
            .collection_exists(name)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        Ok(response
            .collections
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    async fn is_hybrid(&self, name: &str) -> Result<bool, StoreError> {
        self.collection_is_hybrid(name).await
    }

    async fn insert(&self, name: &str, documents: Vec<VectorDocument>) -> Result<(), StoreError> {
        let mut points = Vec::with_capacity(documents.len());
        for doc in &documents {
            points.push(PointStruct::new(
                doc.id.clone(),
                doc.dense_vector.clone(),
                Self::payload_for(doc)?,
            ));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
            .map_err(|e| StoreError::InsertFailed(e.to_string()))?;
        Ok(())
    }

    async fn insert_hybrid(
        &self,
        name: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<(), StoreError> {
        let mut points = Vec::with_capacity(documents.len());
        for doc in &documents {
            let sparse = doc.sparse_vector.as_ref().ok_or_else(|| {
                StoreError::InsertFailed(format!(
                    "document {} is missing its sparse vector for hybrid collection '{name}'",
                    doc.id
                ))
            })?;

            let vectors = NamedVectors::default()
                .add_vector(DENSE_VECTOR, doc.dense_vector.clone())
                .add_vector(
                    SPARSE_VECTOR,
                    Vector::new_sparse(sparse.indices.clone(), sparse.values.clone()),
                );

            points.push(PointStruct::new(
                doc.id.clone(),
                vectors,
                Self::payload_for(doc)?,
            ));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
            .map_err(|e| StoreError::InsertFailed(e.to_string()))?;
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        dense: DenseRequest,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>, StoreError> {
        let limit = dense.limit.min(options.limit).max(1) as u64;
        let mut builder = SearchPointsBuilder::new(name, dense.vector, limit).with_payload(true);

        if self.collection_is_hybrid(name).await? {
            builder = builder.vector_name(DENSE_VECTOR);
        }
        if let Some(expr) = options.filter.as_deref().filter(|f| !f.is_empty()) {
            builder = builder.filter(Self::filter_for(expr)?);
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| StoreError::SearchFailed(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| Self::scored_to_retrieved(point.id, point.score, &point.payload))
            .collect())
    }

    async fn hybrid_search(
        &self,
        name: &str,
        dense: DenseRequest,
        sparse: SparseRequest,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>, StoreError> {
        let mut builder = QueryPointsBuilder::new(name)
            .add_prefetch(
                PrefetchQueryBuilder::default()
                    .query(Query::new_nearest(dense.vector))
                    .using(DENSE_VECTOR)
                    .limit(dense.limit as u64),
            )
            .add_prefetch(
                PrefetchQueryBuilder::default()
                    .query(Query::new_nearest(VectorInput::new_sparse(
                        sparse.vector.indices.clone(),
                        sparse.vector.values.clone(),
                    )))
                    .using(SPARSE_VECTOR)
                    .limit(sparse.limit as u64),
            )
            .query(Query::new_fusion(Fusion::Rrf))
            .limit(options.limit as u64)
            .with_payload(true);

        if let Some(expr) = options.filter.as_deref().filter(|f| !f.is_empty()) {
            builder = builder.filter(Self::filter_for(expr)?);
        }

        let response = self
            .client
            .query(builder)
            .await
            .map_err(|e| StoreError::SearchFailed(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| Self::scored_to_retrieved(point.id, point.score, &point.payload))
            .collect())
    }

    async fn query(
        &self,
        name: &str,
        filter_expr: &str,
        output_fields: &[String],
        limit: usize,
    ) -> Result<Vec<QueryRow>, StoreError> {
        let mut builder = ScrollPointsBuilder::new(name)
            .limit(limit as u32)
            .with_payload(true);
        if !filter_expr.is_empty() {
            builder = builder.filter(Self::filter_for(filter_expr)?);
        }

        let response = self
            .client
            .scroll(builder)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let rows = response
            .result
            .into_iter()
            .map(|point| {
                let mut row = QueryRow::new();
                row.insert("id".to_string(), point_id_string(point.id).into());
                for (key, value) in point.payload {
                    if output_fields.is_empty() || output_fields.iter().any(|f| f == &key) {
                        row.insert(key, value_to_json(value));
                    }
                }
                row
            })
            .collect();

        Ok(rows)
    }

    async fn delete(&self, name: &str, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.clone())).collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(name)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(|e| StoreError::DeleteFailed(e.to_string()))?;
        Ok(())
    }

    async fn check_collection_limit(&self) -> Result<bool, StoreError> {
        match self.max_collections {
            Some(max) => Ok(self.list_collections().await?.len() < max),
            None => Ok(true),
        }
    }
}
