use crate::engine::error::{ReshapeError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior on mapping-source fetches
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (first try included)
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds
    pub max_delay_ms: u64,
    /// Random jitter added to each delay, up to this many milliseconds
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter_ms: 50,
        }
    }
}

impl RetryConfig {
    /// Calculate the backoff delay after a given zero-based attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(exponential + jitter)
    }

    /// Sleep for the appropriate delay
    pub async fn sleep(&self, attempt: u32) {
        tokio::time::sleep(self.calculate_delay(attempt)).await;
    }
}

/// Run an async operation up to `config.max_attempts` times, bounding each
/// attempt by `attempt_timeout` and backing off between attempts. Returns the
/// last error when every attempt fails.
pub(crate) async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    attempt_timeout: Duration,
    what: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;
    for attempt in 0..config.max_attempts.max(1) {
        match tokio::time::timeout(attempt_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                log::debug!("{what} attempt {} failed: {e}", attempt + 1);
                last_error = Some(e);
            }
            Err(_) => {
                log::debug!("{what} attempt {} timed out", attempt + 1);
                last_error = Some(ReshapeError::Timeout(format!(
                    "{what} timed out after {attempt_timeout:?}"
                )));
            }
        }
        if attempt + 1 < config.max_attempts {
            config.sleep(attempt).await;
        }
    }
    Err(last_error.unwrap_or_else(|| ReshapeError::Timeout(format!("{what} never ran"))))
}
