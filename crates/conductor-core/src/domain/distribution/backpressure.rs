//! Batch-boundary backpressure

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Holds the next batch back while too much work is outstanding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backpressure {
    /// Maximum outstanding ÷ pool size before waiting
    pub threshold: f64,
    pub poll_interval: Duration,
}

impl Backpressure {
    pub fn new(threshold: f64, poll_interval: Duration) -> Self {
        Self {
            threshold,
            poll_interval,
        }
    }

    /// Outstanding assignments per worker
    pub fn utilization(outstanding: usize, pool_size: usize) -> f64 {
        if pool_size == 0 {
            0.0
        } else {
            outstanding as f64 / pool_size as f64
        }
    }

    /// Strictly above the threshold
    pub fn is_saturated(&self, outstanding: usize, pool_size: usize) -> bool {
        pool_size > 0 && Self::utilization(outstanding, pool_size) > self.threshold
    }

    /// Poll until utilization is at or below the threshold or `cancel` fires
    ///
    /// Returns how long it waited.
    pub async fn wait_for_capacity<F>(
        &self,
        outstanding: F,
        pool_size: usize,
        cancel: &CancellationToken,
    ) -> Duration
    where
        F: Fn() -> usize,
    {
        let started = Instant::now();
        loop {
            let current = outstanding();
            if !self.is_saturated(current, pool_size) {
                break;
            }
            debug!(
                outstanding = current,
                pool_size,
                threshold = self.threshold,
                "Waiting for worker capacity"
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_threshold_is_exclusive() {
        let backpressure = Backpressure::new(0.5, Duration::from_millis(100));
        assert!(backpressure.is_saturated(3, 4));
        assert!(!backpressure.is_saturated(2, 4));
        assert!(!backpressure.is_saturated(5, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_outstanding_drops() {
        let backpressure = Backpressure::new(0.5, Duration::from_millis(100));
        let outstanding = Arc::new(AtomicUsize::new(3));

        let draining = outstanding.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            draining.store(2, Ordering::SeqCst);
        });

        let waited = backpressure
            .wait_for_capacity(|| outstanding.load(Ordering::SeqCst), 4, &CancellationToken::new())
            .await;

        assert!(waited >= Duration::from_millis(350));
        assert!(waited < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_wait() {
        let backpressure = Backpressure::new(0.1, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let waited = backpressure.wait_for_capacity(|| 10, 2, &cancel).await;
        assert!(waited >= Duration::from_secs(3));
    }
}
