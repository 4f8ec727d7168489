//! Embedding provider abstraction
//!
//! The engine consumes providers through [`EmbeddingClient`]; two HTTP
//! adapters are included (OpenAI-compatible and Ollama). Retry lives in
//! [`retry`] and is shared by both.

mod ollama;
mod openai;
pub mod retry;

pub use ollama::OllamaEmbedding;
pub use openai::OpenAiEmbedding;
pub use retry::RetryPolicy;

use crate::error::EmbeddingError;
use async_trait::async_trait;
use std::time::Duration;

/// Delay between per-item fallback calls after a batch failure
const ITEM_FALLBACK_DELAY: Duration = Duration::from_millis(100);

/// Embeds text into fixed-dimension dense vectors
#[async_trait]
pub trait EmbeddingClient: Send + Sync + std::fmt::Debug {
    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch; `result[i]` corresponds to `texts[i]`
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embedding dimension, when known without a probe
    fn dimension(&self) -> Option<usize>;
}

/// Providers reject empty input; replace it with a single space
pub fn preprocess_text(text: &str) -> &str {
    if text.is_empty() {
        " "
    } else {
        text
    }
}

/// Embed a batch, degrading to per-item calls if the batch fails after
/// the provider's retries.
///
/// Returns one slot per input; a slot is `None` when that item failed
/// individually (the caller skips it with a WARN). Order is preserved.
pub async fn embed_batch_with_fallback(
    client: &dyn EmbeddingClient,
    texts: &[String],
) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
    match client.embed_batch(texts).await {
        Ok(vectors) => {
            if vectors.len() != texts.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "batch returned {} vectors for {} inputs",
                    vectors.len(),
                    texts.len()
                )));
            }
            Ok(vectors.into_iter().map(Some).collect())
        }
        Err(batch_error) => {
            if !batch_error.is_retryable() {
                return Err(batch_error);
            }
            tracing::warn!(
                "Batch embedding failed after retries ({}), falling back to per-item calls",
                batch_error
            );

            let mut results = Vec::with_capacity(texts.len());
            for (i, text) in texts.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(ITEM_FALLBACK_DELAY).await;
                }
                match client.embed(text).await {
                    Ok(vector) => results.push(Some(vector)),
                    Err(e) => {
                        tracing::warn!("Skipping item {} after embedding failure: {}", i, e);
                        results.push(None);
                    }
                }
            }
            Ok(results)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_preprocess_text() {
        assert_eq!(preprocess_text(""), " ");
        assert_eq!(preprocess_text("code"), "code");
        assert_eq!(preprocess_text("  "), "  ");
    }

    /// Embedder whose batches always fail retryably and whose per-item
    /// calls fail for one specific input
    #[derive(Debug)]
    struct FlakyEmbedder {
        poison: String,
        batch_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingClient for FlakyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text == self.poison {
                return Err(EmbeddingError::Provider {
                    message: "timeout".into(),
                    retryable: true,
                });
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            Err(EmbeddingError::Provider {
                message: "service unavailable".into(),
                retryable: true,
            })
        }

        fn dimension(&self) -> Option<usize> {
            Some(2)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_preserves_order_and_skips_failures() {
        let embedder = FlakyEmbedder {
            poison: "bad".into(),
            batch_calls: Arc::new(AtomicUsize::new(0)),
        };
        let texts = vec!["aaaa".to_string(), "bad".to_string(), "cc".to_string()];

        let results = embed_batch_with_fallback(&embedder, &texts).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap()[0], 4.0);
        assert!(results[1].is_none());
        assert_eq!(results[2].as_ref().unwrap()[0], 2.0);
    }

    /// Embedder that fails batches non-retryably
    #[derive(Debug)]
    struct RejectingEmbedder;

    #[async_trait]
    impl EmbeddingClient for RejectingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            unreachable!("per-item fallback must not run for non-retryable batch errors")
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Provider {
                message: "invalid api key".into(),
                retryable: false,
            })
        }

        fn dimension(&self) -> Option<usize> {
            None
        }
    }

    #[tokio::test]
    async fn test_non_retryable_batch_error_propagates() {
        let texts = vec!["x".to_string()];
        let err = embed_batch_with_fallback(&RejectingEmbedder, &texts)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
