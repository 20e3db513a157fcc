//! Bounded retry with exponential backoff for calls to external services.
//!
//! Only the transcription and chat-completion calls go through here; local
//! decoding and classification failures are never retried.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const LOG_TARGET: &str = "util::retry";

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Default::default()
        }
    }

    /// A single attempt, no retry.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exp);
        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

/// Runs `f` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. The last error is returned as is.
pub async fn retry_with_backoff<F, T, E, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut f: F,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(target: LOG_TARGET, operation, attempt, "succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    target: LOG_TARGET,
                    operation,
                    attempt,
                    max_attempts,
                    ?delay,
                    error = %e,
                    "attempt failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn is_http_retryable(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}
