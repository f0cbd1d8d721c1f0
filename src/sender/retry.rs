//! # Retryable sender (C5)
//!
//! Wraps any [`Sender`] with exponential backoff. Hand-rolled rather
//! than pulled from a crate, matching the reconnection loop in the
//! upstream federation client this design is grounded on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

use super::{Frame, Sender};

/// `next_interval(attempt) = min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackOff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackOff {
    /// Build a backoff schedule from `config`.
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base: config.base_interval,
            max: config.max_interval,
        }
    }

    /// The delay to wait before attempt number `attempt` (0-indexed:
    /// `attempt == 0` is the delay before the first retry).
    pub fn next_interval(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(63));
        let scaled = self.base.as_millis().saturating_mul(factor as u128);
        let capped = scaled.min(self.max.as_millis());
        Duration::from_millis(capped as u64)
    }
}

/// A sender that retries a wrapped sender on retryable errors,
/// surfacing a terminal [`Error::RetryOver`] once `max_retry_count`
/// attempts have failed.
pub struct RetrySender<S> {
    inner: S,
    config: RetryConfig,
    backoff: ExponentialBackOff,
    on_retry_over: Option<Arc<dyn Fn(&Error) + Send + Sync>>,
}

impl<S: Sender> RetrySender<S> {
    /// Wrap `inner` with the given retry policy.
    pub fn new(inner: S, config: RetryConfig) -> Self {
        let backoff = ExponentialBackOff::new(&config);
        Self {
            inner,
            config,
            backoff,
            on_retry_over: None,
        }
    }

    /// Register a callback invoked (in addition to the caller's
    /// `Result`) whenever retries are exhausted.
    pub fn on_retry_over(mut self, callback: Arc<dyn Fn(&Error) + Send + Sync>) -> Self {
        self.on_retry_over = Some(callback);
        self
    }
}

#[async_trait]
impl<S: Sender> Sender for RetrySender<S> {
    async fn send(&self, frame: &Frame) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.inner.send(frame).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt + 1 < self.config.max_retry_count => {
                    let delay = self.backoff.next_interval(attempt);
                    tracing::warn!(attempt, delay_ms = %delay.as_millis(), error = %e, "retrying send");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let over = Error::RetryOver {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    };
                    if let Some(callback) = &self.on_retry_over {
                        callback(&over);
                    }
                    return Err(over);
                }
            }
        }
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySender {
        fail_count: AtomicU32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Sender for FlakySender {
        async fn send(&self, _frame: &Frame) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_count.load(Ordering::SeqCst) > 0 {
                self.fail_count.fetch_sub(1, Ordering::SeqCst);
                Err(Error::AckTimeout)
            } else {
                Ok(())
            }
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn close(&self) {}
    }

    fn frame() -> Frame {
        Frame {
            bytes: vec![1],
            ack_token: None,
        }
    }

    fn fast_retry_config() -> RetryConfig {
        RetryConfig {
            max_retry_count: 5,
            base_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn backoff_doubles_and_then_caps() {
        let backoff = ExponentialBackOff::new(&RetryConfig {
            max_retry_count: 10,
            base_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(1000),
        });
        assert_eq!(backoff.next_interval(0), Duration::from_millis(100));
        assert_eq!(backoff.next_interval(1), Duration::from_millis(200));
        assert_eq!(backoff.next_interval(2), Duration::from_millis(400));
        assert_eq!(backoff.next_interval(10), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let sender = RetrySender::new(
            FlakySender {
                fail_count: AtomicU32::new(2),
                attempts: AtomicU32::new(0),
            },
            fast_retry_config(),
        );
        sender.send(&frame()).await.unwrap();
        assert_eq!(sender.inner.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_retries_surfaces_retry_over() {
        let sender = RetrySender::new(
            FlakySender {
                fail_count: AtomicU32::new(100),
                attempts: AtomicU32::new(0),
            },
            fast_retry_config(),
        );
        let err = sender.send(&frame()).await.unwrap_err();
        match err {
            Error::RetryOver { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("expected RetryOver, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_over_invokes_the_error_callback() {
        let invoked = Arc::new(AtomicU32::new(0));
        let invoked_for_closure = invoked.clone();
        let sender = RetrySender::new(
            FlakySender {
                fail_count: AtomicU32::new(100),
                attempts: AtomicU32::new(0),
            },
            fast_retry_config(),
        )
        .on_retry_over(Arc::new(move |_err| {
            invoked_for_closure.fetch_add(1, Ordering::SeqCst);
        }));

        let _ = sender.send(&frame()).await;
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }
}
