//! Retry and backoff for bridge requests.
//!
//! Short requests (discovery, status reads) go through [`with_retry`]; the
//! event stream loop keeps a [`Backoff`] across reconnects instead.
//!
//! ```
//! use huemon_core::{Error, RetryConfig, with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! let names = with_retry(&RetryConfig::for_request(), "list sensors", || async {
//!     Ok::<_, Error>(vec!["Hall"])
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::Result;

/// Delay schedule: `initial_delay` doubled per failure, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Stretch each delay by a random 0..25%.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_request()
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self::default().max_retries(max_retries)
    }

    /// Single attempt.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Discovery and status reads: three retries within a few seconds.
    pub fn for_request() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }

    /// Event stream reconnects: unbounded, at most a minute apart.
    pub fn for_reconnect() -> Self {
        Self {
            max_retries: u32::MAX,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay after `failures` consecutive failures (0 = first failure).
    pub(crate) fn delay_after(&self, failures: u32) -> Duration {
        // 2^31 already exceeds any sensible cap
        let factor = 1u32 << failures.min(31);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay));
        if self.jitter {
            delay.mul_f64(1.0 + rand::rng().random_range(0.0..0.25))
        } else {
            delay
        }
    }
}

/// Failure counter for loops that retry forever, such as reconnects.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before the next try.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.config.delay_after(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Back to the initial delay after a healthy connection.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.failures
    }
}

/// Run `operation` until it succeeds, fails permanently or the retries are
/// used up.
///
/// Errors for which [`Error::is_retryable`](crate::Error::is_retryable) is false
/// are returned at once.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, what: &str, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(config.clone());
    loop {
        let error = match operation().await {
            Ok(value) => {
                if backoff.attempts() > 0 {
                    debug!("{}: ok after {} retries", what, backoff.attempts());
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        if backoff.attempts() >= config.max_retries {
            warn!("{}: giving up after {} attempts: {}", what, backoff.attempts() + 1, error);
            return Err(error);
        }
        let delay = backoff.next_delay();
        warn!("{}: {} (retry {} in {:?})", what, error, backoff.attempts(), delay);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fixed(max_retries: u32) -> RetryConfig {
        RetryConfig::for_request()
            .max_retries(max_retries)
            .initial_delay(Duration::from_secs(1))
            .jitter(false)
    }

    #[test]
    fn test_delays_double_up_to_cap() {
        let config = fixed(5).max_delay(Duration::from_secs(6));
        let delays: Vec<_> = (0..5).map(|n| config.delay_after(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 6, 6]);
        assert_eq!(config.delay_after(u32::MAX), Duration::from_secs(6));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let config = fixed(1).jitter(true);
        for _ in 0..50 {
            let delay = config.delay_after(0);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay < Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_backoff_resets() {
        let mut backoff = Backoff::new(RetryConfig::for_reconnect().jitter(false));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.attempts(), 2);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let sensors = with_retry(&fixed(3), "list sensors", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Status {
                    status: 503,
                    url: "https://bridge/clip/v2/resource/device".into(),
                })
            } else {
                Ok(2)
            }
        })
        .await
        .unwrap();

        assert_eq!(sensors, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // waited 1s then 2s
        assert_eq!(started.elapsed().as_secs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fixed(2), "read status", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Request("bridge busy".into()))
        })
        .await;

        assert!(matches!(result, Err(Error::Request(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fixed(3), "read status", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::invalid_data("no motion section"))
        })
        .await;

        assert!(matches!(result, Err(Error::InvalidData(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
