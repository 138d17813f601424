//! Bounded retry for chat delivery calls.

use std::future::Future;
use std::time::Duration;

use crate::config::QueueConfig;

use super::adapter::DeliveryError;

/// How many times to try a delivery and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Backoff before retry number `retry` (0-based), doubling and capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        std::cmp::min(self.backoff_base.saturating_mul(factor), self.backoff_max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempts run out.
///
/// A [`DeliveryError::RetryAfter`] hint replaces the computed backoff for that
/// wait and still counts as an attempt.
pub async fn deliver_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, DeliveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeliveryError>>,
{
    let mut attempt = 1;
    loop {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !error.is_retryable() || attempt >= policy.max_attempts {
            return Err(error);
        }

        let wait = error
            .retry_after()
            .unwrap_or_else(|| policy.backoff((attempt - 1) as u32));
        tracing::warn!(
            operation = what,
            attempt,
            max_attempts = policy.max_attempts,
            error = %error,
            "Delivery failed, retrying in {:?}",
            wait
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}
