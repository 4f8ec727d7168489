//! Ollama embedding adapter
//!
//! Talks to a local Ollama instance's `POST {endpoint}/api/embed`.

use super::retry::{is_retryable, RetryPolicy};
use super::{preprocess_text, EmbeddingClient};
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: Option<usize>,
    retry: RetryPolicy,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedding {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
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
            .post(format!("{}/api/embed", self.endpoint))
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

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        if let Some(expected) = self.dimension {
            for vector in &parsed.embeddings {
                if vector.len() != expected {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
            }
        }

        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
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
