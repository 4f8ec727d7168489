//! Retry classification and backoff policy for embedding providers
//!
//! Classification is a pure predicate over status code and message so it
//! stays orthogonal to the provider adapters: HTTP 400/401/403 and
//! malformed-request messages fail immediately; 429/5xx, network errno
//! strings, and rate-limit style messages back off and retry.

use crate::error::EmbeddingError;
use std::future::Future;
use std::time::Duration;

const RETRYABLE_MESSAGES: &[&str] = &[
    "econnrefused",
    "etimedout",
    "enotfound",
    "eai_again",
    "rate limit",
    "quota exceeded",
    "service unavailable",
    "timeout",
    "connection",
];

const NON_RETRYABLE_MESSAGES: &[&str] = &["malformed", "invalid request", "bad request"];

/// Decide whether a provider failure is worth retrying
pub fn is_retryable(status: Option<u16>, message: &str) -> bool {
    if let Some(status) = status {
        if matches!(status, 400 | 401 | 403) {
            return false;
        }
        if status == 429 || status >= 500 {
            return true;
        }
    }

    let lowered = message.to_lowercase();
    if NON_RETRYABLE_MESSAGES.iter().any(|m| lowered.contains(m)) {
        return false;
    }
    RETRYABLE_MESSAGES.iter().any(|m| lowered.contains(m))
}

/// Exponential backoff: base delay doubling per attempt, capped
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` with retries for retryable failures
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, EmbeddingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EmbeddingError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        "Embedding attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
