//! Bounded retry with exponential backoff.

use crate::error::ApodError;
use crate::rate_limit::RequestSpacer;
use crate::types::DownloadConfig;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempt budget and backoff shape for one class of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Cap for any single delay.
    pub max_delay: Duration,
    /// Timeout for each individual attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts,
            base_delay: config.backoff_base,
            max_delay: config.backoff_max,
            attempt_timeout: config.request_timeout,
        }
    }

    /// Delay to wait after the failed attempt numbered `attempt` (1-indexed).
    ///
    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
///
/// `op` receives the 1-indexed attempt number. Every attempt runs under its
/// own timeout; an elapsed timeout counts as a transient network failure.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    op: F,
) -> Result<T, ApodError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ApodError>>,
{
    run_attempts(policy, label, None, op).await
}

/// Like [`retry_with_backoff`], but every attempt first waits its turn at
/// `spacer`. The wait happens before the attempt timeout starts, so time
/// spent queued at the gate never counts against the request.
pub async fn retry_spaced<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    spacer: &RequestSpacer,
    op: F,
) -> Result<T, ApodError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ApodError>>,
{
    run_attempts(policy, label, Some(spacer), op).await
}

async fn run_attempts<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    spacer: Option<&RequestSpacer>,
    mut op: F,
) -> Result<T, ApodError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ApodError>>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        if let Some(spacer) = spacer {
            spacer.wait_turn().await;
        }
        let result = match tokio::time::timeout(policy.attempt_timeout, op(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(ApodError::TransientNetwork(format!(
                "attempt timed out after {:?}",
                policy.attempt_timeout
            ))),
        };

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt >= max_attempts {
            warn!("{} failed after {} attempts: {}", label, attempt, err);
            return Err(err);
        }

        let delay = policy.backoff_delay(attempt);
        warn!(
            "{} attempt {}/{} failed: {}; retrying in {:?}",
            label, attempt, max_attempts, err, delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
