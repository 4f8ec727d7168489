//! Milvus vector store adapter over the v2 RESTful API
//!
//! Dense collections use a single `vector` field; hybrid collections add
//! a `sparse` SparseFloatVector field and search through the
//! advanced-search endpoint with server-side RRF reranking.

use super::{
    fields, DenseRequest, FilterExpr, QueryRow, RetrievedDocument, SearchOptions, SparseRequest,
    VectorDocument, VectorStore,
};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

const DENSE_FIELD: &str = "vector";
const SPARSE_FIELD: &str = "sparse";

#[derive(Debug)]
pub struct MilvusStore {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    hybrid_cache: RwLock<HashMap<String, bool>>,
    max_collections: Option<usize>,
}

impl MilvusStore {
    pub fn connect(
        endpoint: &str,
        token: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to Milvus at {}", endpoint);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            hybrid_cache: RwLock::new(HashMap::new()),
            max_collections: None,
        })
    }

    /// Cap the number of collections this client will report capacity for
    pub fn with_collection_cap(mut self, max: usize) -> Self {
        self.max_collections = Some(max);
        self
    }

    /// POST one API call and unwrap the `{code, data}` envelope
    async fn post(&self, path: &str, body: Value) -> Result<Value, StoreError> {
        let mut request = self
            .client
            .post(format!("{}{}", self.endpoint, path))
            .json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("HTTP {status}: {e}")))?;

        let code = payload.get("code").and_then(Value::as_i64).unwrap_or(-1);
        if code != 0 {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown Milvus error")
                .to_string();
            return Err(StoreError::QueryFailed(format!(
                "{path} failed (code {code}): {message}"
            )));
        }

        Ok(payload.get("data").cloned().unwrap_or(Value::Null))
    }

    fn schema(dimension: usize, hybrid: bool) -> Value {
        let mut field_list = vec![
            json!({
                "fieldName": "id",
                "dataType": "VarChar",
                "isPrimary": true,
                "elementTypeParams": { "max_length": 64 },
            }),
            json!({
                "fieldName": DENSE_FIELD,
                "dataType": "FloatVector",
                "elementTypeParams": { "dim": dimension },
            }),
            json!({
                "fieldName": fields::CONTENT,
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": 65535 },
            }),
            json!({
                "fieldName": fields::RELATIVE_PATH,
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": 1024 },
            }),
            json!({ "fieldName": fields::START_LINE, "dataType": "Int64" }),
            json!({ "fieldName": fields::END_LINE, "dataType": "Int64" }),
            json!({
                "fieldName": fields::FILE_EXTENSION,
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": 32 },
            }),
            json!({
                "fieldName": fields::METADATA,
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": 65535 },
            }),
        ];
        if hybrid {
            field_list.push(json!({
                "fieldName": SPARSE_FIELD,
                "dataType": "SparseFloatVector",
            }));
        }
        json!({ "fields": field_list })
    }

    fn index_params(hybrid: bool) -> Value {
        let mut params = vec![json!({
            "fieldName": DENSE_FIELD,
            "metricType": "COSINE",
            "indexName": DENSE_FIELD,
        })];
        if hybrid {
            params.push(json!({
                "fieldName": SPARSE_FIELD,
                "metricType": "IP",
                "indexName": SPARSE_FIELD,
            }));
        }
        Value::Array(params)
    }

    async fn create(
        &self,
        name: &str,
        dimension: usize,
        hybrid: bool,
    ) -> Result<(), StoreError> {
        self.post(
            "/v2/vectordb/collections/create",
            json!({
                "collectionName": name,
                "schema": Self::schema(dimension, hybrid),
                "indexParams": Self::index_params(hybrid),
            }),
        )
        .await
        .map_err(|e| StoreError::CollectionCreationFailed {
            collection: name.to_string(),
            reason: e.to_string(),
        })?;

        self.post(
            "/v2/vectordb/collections/load",
            json!({ "collectionName": name }),
        )
        .await
        .map_err(|e| StoreError::CollectionCreationFailed {
            collection: name.to_string(),
            reason: format!("load: {e}"),
        })?;

        self.hybrid_cache
            .write()
            .await
            .insert(name.to_string(), hybrid);
        Ok(())
    }

    /// Milvus sparse vectors travel as an index→value JSON object
    fn sparse_json(sparse: &crate::bm25::SparseVector) -> Value {
        let mut map = serde_json::Map::new();
        for (index, value) in sparse.indices.iter().zip(&sparse.values) {
            map.insert(index.to_string(), json!(value));
        }
        Value::Object(map)
    }

    fn row_for(doc: &VectorDocument, hybrid: bool) -> Result<Value, StoreError> {
        let mut row = json!({
            "id": doc.id,
            DENSE_FIELD: doc.dense_vector,
            fields::CONTENT: doc.content,
            fields::RELATIVE_PATH: doc.relative_path,
            fields::START_LINE: doc.start_line,
            fields::END_LINE: doc.end_line,
            fields::FILE_EXTENSION: doc.file_extension,
            fields::METADATA: doc.metadata,
        });
        if hybrid {
            let sparse = doc.sparse_vector.as_ref().ok_or_else(|| {
                StoreError::InsertFailed(format!(
                    "document {} is missing its sparse vector for a hybrid collection",
                    doc.id
                ))
            })?;
            row[SPARSE_FIELD] = Self::sparse_json(sparse);
        }
        Ok(row)
    }

    /// Milvus filters use `==` and `in` with double-quoted strings
    fn filter_for(expr: &str) -> Result<String, StoreError> {
        match FilterExpr::parse(expr)? {
            FilterExpr::Eq { field, value } => Ok(format!("{field} == \"{value}\"")),
            FilterExpr::In { field, values } => {
                let quoted: Vec<String> = values.iter().map(|v| format!("\"{v}\"")).collect();
                Ok(format!("{field} in [{}]", quoted.join(",")))
            }
        }
    }

    fn hit_to_retrieved(hit: &Value) -> RetrievedDocument {
        let get_str =
            |key: &str| hit.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let get_i64 = |key: &str| hit.get(key).and_then(Value::as_i64).unwrap_or_default();

        RetrievedDocument {
            id: get_str("id"),
            content: get_str(fields::CONTENT),
            relative_path: get_str(fields::RELATIVE_PATH),
            start_line: get_i64(fields::START_LINE),
            end_line: get_i64(fields::END_LINE),
            file_extension: get_str(fields::FILE_EXTENSION),
            metadata: get_str(fields::METADATA),
            score: hit
                .get("distance")
                .or_else(|| hit.get("score"))
                .and_then(Value::as_f64)
                .unwrap_or_default() as f32,
        }
    }

    const OUTPUT_FIELDS: [&'static str; 6] = [
        fields::CONTENT,
        fields::RELATIVE_PATH,
        fields::START_LINE,
        fields::END_LINE,
        fields::FILE_EXTENSION,
        fields::METADATA,
    ];
}

#[async_trait]
impl VectorStore for MilvusStore {
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
        if !self.has_collection(name).await? {
            return Ok(());
        }
        self.post(
            "/v2/vectordb/collections/drop",
            json!({ "collectionName": name }),
        )
        .await
        .map_err(|e| StoreError::DeleteFailed(format!("drop '{name}': {e}")))?;
        self.hybrid_cache.write().await.remove(name);
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        let data = self
            .post(
                "/v2/vectordb/collections/has",
                json!({ "collectionName": name }),
            )
            .await?;
        Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let data = self.post("/v2/vectordb/collections/list", json!({})).await?;
        Ok(data
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn is_hybrid(&self, name: &str) -> Result<bool, StoreError> {
        if let Some(&hybrid) = self.hybrid_cache.read().await.get(name) {
            return Ok(hybrid);
        }

        let data = self
            .post(
                "/v2/vectordb/collections/describe",
                json!({ "collectionName": name }),
            )
            .await
            .map_err(|e| StoreError::CollectionNotFound(format!("{name}: {e}")))?;

        let hybrid = data
            .get("fields")
            .and_then(Value::as_array)
            .is_some_and(|fields_list| {
                fields_list.iter().any(|f| {
                    f.get("name").and_then(Value::as_str) == Some(SPARSE_FIELD)
                })
            });

        self.hybrid_cache
            .write()
            .await
            .insert(name.to_string(), hybrid);
        Ok(hybrid)
    }

    async fn insert(&self, name: &str, documents: Vec<VectorDocument>) -> Result<(), StoreError> {
        let rows: Result<Vec<Value>, StoreError> = documents
            .iter()
            .map(|doc| Self::row_for(doc, false))
            .collect();
        self.post(
            "/v2/vectordb/entities/insert",
            json!({ "collectionName": name, "data": rows? }),
        )
        .await
        .map_err(|e| StoreError::InsertFailed(e.to_string()))?;
        Ok(())
    }

    async fn insert_hybrid(
        &self,
        name: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<(), StoreError> {
        let rows: Result<Vec<Value>, StoreError> = documents
            .iter()
            .map(|doc| Self::row_for(doc, true))
            .collect();
        self.post(
            "/v2/vectordb/entities/insert",
            json!({ "collectionName": name, "data": rows? }),
        )
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
        let mut body = json!({
            "collectionName": name,
            "data": [dense.vector],
            "annsField": DENSE_FIELD,
            "limit": dense.limit.min(options.limit).max(1),
            "outputFields": Self::OUTPUT_FIELDS,
        });
        if let Some(expr) = options.filter.as_deref().filter(|f| !f.is_empty()) {
            body["filter"] = json!(Self::filter_for(expr)?);
        }

        let data = self
            .post("/v2/vectordb/entities/search", body)
            .await
            .map_err(|e| StoreError::SearchFailed(e.to_string()))?;

        Ok(data
            .as_array()
            .map(|hits| hits.iter().map(Self::hit_to_retrieved).collect())
            .unwrap_or_default())
    }

    async fn hybrid_search(
        &self,
        name: &str,
        dense: DenseRequest,
        sparse: SparseRequest,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedDocument>, StoreError> {
        let mut dense_branch = json!({
            "data": [dense.vector],
            "annsField": DENSE_FIELD,
            "limit": dense.limit,
        });
        let mut sparse_branch = json!({
            "data": [Self::sparse_json(&sparse.vector)],
            "annsField": SPARSE_FIELD,
            "limit": sparse.limit,
        });
        if let Some(expr) = options.filter.as_deref().filter(|f| !f.is_empty()) {
            let filter = Self::filter_for(expr)?;
            dense_branch["filter"] = json!(filter);
            sparse_branch["filter"] = json!(filter);
        }

        let body = json!({
            "collectionName": name,
            "search": [dense_branch, sparse_branch],
            "rerank": {
                "strategy": "rrf",
                "params": { "k": options.rrf_k },
            },
            "limit": options.limit,
            "outputFields": Self::OUTPUT_FIELDS,
        });

        let data = self
            .post("/v2/vectordb/entities/advanced_search", body)
            .await
            .map_err(|e| StoreError::SearchFailed(e.to_string()))?;

        Ok(data
            .as_array()
            .map(|hits| hits.iter().map(Self::hit_to_retrieved).collect())
            .unwrap_or_default())
    }

    async fn query(
        &self,
        name: &str,
        filter_expr: &str,
        output_fields: &[String],
        limit: usize,
    ) -> Result<Vec<QueryRow>, StoreError> {
        let wanted: Vec<String> = if output_fields.is_empty() {
            let mut all: Vec<String> = Self::OUTPUT_FIELDS.iter().map(|f| f.to_string()).collect();
            all.push("id".to_string());
            all
        } else {
            let mut list = output_fields.to_vec();
            if !list.iter().any(|f| f == "id") {
                list.push("id".to_string());
            }
            list
        };

        let mut body = json!({
            "collectionName": name,
            "outputFields": wanted,
            "limit": limit,
        });
        body["filter"] = if filter_expr.is_empty() {
            // Milvus requires a filter; an always-true predicate lists all
            json!("id != \"\"")
        } else {
            json!(Self::filter_for(filter_expr)?)
        };

        let data = self.post("/v2/vectordb/entities/query", body).await?;

        Ok(data
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.as_object().cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, name: &str, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let quoted: Vec<String> = ids.iter().map(|id| format!("\"{id}\"")).collect();
        self.post(
            "/v2/vectordb/entities/delete",
            json!({
                "collectionName": name,
                "filter": format!("id in [{}]", quoted.join(",")),
            }),
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
