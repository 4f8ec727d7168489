//! OpenAI-compatible embedding adapter
//!
//! Talks to `POST {endpoint}/v1/embeddings` with bearer auth. Any service
//! exposing the same wire format (OpenAI, VoyageAI-compatible proxies,
//! local gateways) works through this adapter.

use super::retry::{is_retryable, RetryPolicy};
use super::{preprocess_text, EmbeddingClient};
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug)]
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: Option<usize>,
    retry: RetryPolicy,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedding {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                retryable: false,
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            retry: RetryPolicy::new(config.max_retries, config.base_delay_ms),
            timeout_secs: config.timeout_secs,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let inputs: Vec<&str> = texts.iter().map(|t| preprocess_text(t)).collect();
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout(self.timeout_secs)
                } else {
                    let message = e.to_string();
                    EmbeddingError::Provider {
                        retryable: is_retryable(None, &message) || e.is_connect(),
                        message,
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Provider {
                retryable: is_retryable(Some(status.as_u16()), &message),
                message: format!("HTTP {status}: {message}"),
            });
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // The API is allowed to reorder; the index field restores input order
        let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        for item in parsed.data {
            if item.index >= vectors.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "embedding index {} out of range",
                    item.index
                )));
            }
            vectors[item.index] = item.embedding;
        }

        if let Some(expected) = self.dimension {
            for vector in &vectors {
                if vector.len() != expected {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
            }
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let texts = [text.to_string()];
        let mut vectors = self.retry.run(|| self.request(&texts)).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.retry.run(|| self.request(texts)).await
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}
