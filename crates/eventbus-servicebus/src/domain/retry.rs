//! Retry policy for transient broker failures.
//!
//! Exponential backoff: `min_backoff * 2^attempt`, capped at `max_backoff`.
//! Only [`BrokerError::Transient`] is retried.

use std::future::Future;
use std::time::Duration;

use eventbus_base::EventBusConfig;
use tracing::warn;

use super::errors::BrokerError;

/// Default first backoff.
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_millis(100);
/// Default backoff ceiling.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry policy for broker calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Policy with default backoff bounds.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    /// Policy driven by the configured retry count.
    pub fn from_config(config: &EventBusConfig) -> Self {
        Self::new(config.retry_count)
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Override the backoff bounds.
    #[must_use]
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.min_backoff = min;
        self.max_backoff = max.max(min);
        self
    }

    /// Maximum number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.min_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Run `call`, retrying transient failures.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, BrokerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrokerError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    warn!(
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient broker failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(eventbus_base::config::DEFAULT_RETRY_COUNT)
    }
}
