//! Process-wide spacing between outgoing requests.
//!
//! The anonymous APOD tier allows only a handful of requests per hour, so
//! without a personal key every request (metadata or media) waits for its
//! turn at a single shared gate.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Shared gate enforcing a minimum interval between request starts.
#[derive(Debug)]
pub struct RequestSpacer {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestSpacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    /// A gate that never waits.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until at least `interval` has passed since the previous caller
    /// was let through, then records and returns the admission instant.
    ///
    /// The lock is held across the sleep so callers are admitted strictly one
    /// at a time.
    pub async fn wait_turn(&self) -> Instant {
        if self.interval.is_zero() {
            return Instant::now();
        }
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            if ready_at > Instant::now() {
                debug!("Request spacing: waiting {:?}", ready_at - Instant::now());
                tokio::time::sleep_until(ready_at).await;
            }
        }
        let now = Instant::now();
        *last = Some(now);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let spacer = RequestSpacer::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            spacer.wait_turn().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_spaced() {
        let interval = Duration::from_millis(40);
        let spacer = Arc::new(RequestSpacer::new(interval));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let spacer = Arc::clone(&spacer);
            handles.push(tokio::spawn(async move {
                spacer.wait_turn().await
            }));
        }
        let mut admitted = Vec::new();
        for h in handles {
            admitted.push(h.await.unwrap());
        }
        admitted.sort();
        for pair in admitted.windows(2) {
            assert!(pair[1] - pair[0] >= interval, "gap {:?}", pair[1] - pair[0]);
        }
    }
}
