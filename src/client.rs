//! Rate limiting and retry for external calls.
//!
//! Every external service (each news source, the geocoder) is reached through
//! a [`RateLimitedClient`], a decorator that enforces a minimum delay between
//! consecutive calls and retries transient failures with exponential backoff.
//!
//! # Architecture
//!
//! - [`RateLimiter`]: a floor between consecutive calls from this process
//! - [`RetryPolicy`]: attempt count and backoff schedule
//! - [`RateLimitedClient`]: wraps any [`Fetcher`] or [`Geocoder`] and
//!   implements the same trait, so callers never see the difference
//!
//! # Backoff Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! Only errors for which [`crate::error::Error::is_transient`] holds are retried.

use crate::error::Result;
use crate::fetch::{FetchResponse, Fetcher};
use crate::geocode::Geocoder;
use crate::models::GeoPoint;
use rand::{Rng, rng};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{error, instrument, warn};

/// Enforces a minimum delay between consecutive calls.
///
/// The delay is a floor, not a cap: callers that arrive later than
/// `min_delay` after the previous call proceed immediately.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Wait until a call is allowed, then record it.
    ///
    /// The lock is held across the sleep so concurrent callers queue up and
    /// are released one `min_delay` apart.
    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                sleep(self.min_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Retry schedule for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    pub base_delay: Duration,
    /// Cap on the exponential part of the delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Backoff before retry number `attempt` (1-based), jitter included.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let mut delay = self.base_delay.saturating_mul(1 << shift);
        if delay > self.max_delay {
            delay = self.max_delay;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Decorator adding a call floor and retries to an external client.
pub struct RateLimitedClient<T> {
    name: String,
    inner: T,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl<T> RateLimitedClient<T> {
    /// Wrap `inner`; `name` only shows up in logs.
    pub fn new(name: impl Into<String>, inner: T, min_delay: Duration, retry: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            inner,
            limiter: RateLimiter::new(min_delay),
            retry,
        }
    }

    /// Run `op` under the limiter, retrying transient failures.
    ///
    /// Each attempt goes through the limiter, so retries respect the floor too.
    async fn call<R, Op, Fut>(&self, mut op: Op) -> Result<R>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            self.limiter.acquire().await;
            let attempt_t0 = Instant::now();
            match op().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_transient() {
                        return Err(e);
                    }
                    if attempt > self.retry.max_retries {
                        error!(
                            client = %self.name,
                            attempt,
                            max = self.retry.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "call exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        client = %self.name,
                        attempt,
                        max = self.retry.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "call failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl<T> fmt::Debug for RateLimitedClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("name", &self.name)
            .field("min_delay", &self.limiter.min_delay())
            .field("retry", &self.retry)
            .finish()
    }
}

impl<F: Fetcher> Fetcher for RateLimitedClient<F> {
    #[instrument(level = "debug", skip(self), fields(client = %self.name))]
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        self.call(|| self.inner.fetch(url)).await
    }
}

impl<G: Geocoder> Geocoder for RateLimitedClient<G> {
    #[instrument(level = "debug", skip(self), fields(client = %self.name))]
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>> {
        self.call(|| self.inner.geocode(query)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with the given status a fixed number of times, then succeeds.
    struct Flaky {
        failures: usize,
        status: u16,
        calls: AtomicUsize,
    }

    impl Fetcher for Flaky {
        async fn fetch(&self, url: &str) -> Result<FetchResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(Error::Status { status: self.status, url: url.to_string() })
            } else {
                Ok(FetchResponse::ok(url, "body"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_enforces_floor() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let t0 = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(t0.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_does_not_delay_late_callers() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        limiter.acquire().await;
        sleep(Duration::from_secs(2)).await;
        let t0 = Instant::now();
        limiter.acquire().await;
        assert!(t0.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let flaky = Flaky { failures: 2, status: 503, calls: AtomicUsize::new(0) };
        let client = RateLimitedClient::new(
            "test",
            flaky,
            Duration::from_millis(10),
            RetryPolicy::new(3, Duration::from_millis(100)),
        );
        let resp = client.fetch("https://example.com").await.unwrap();
        assert_eq!(resp.body, "body");
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failures_are_not_retried() {
        let flaky = Flaky { failures: 5, status: 404, calls: AtomicUsize::new(0) };
        let client = RateLimitedClient::new(
            "test",
            flaky,
            Duration::ZERO,
            RetryPolicy::new(3, Duration::from_millis(100)),
        );
        assert!(client.fetch("https://example.com").await.is_err());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let flaky = Flaky { failures: 10, status: 500, calls: AtomicUsize::new(0) };
        let client = RateLimitedClient::new(
            "test",
            flaky,
            Duration::ZERO,
            RetryPolicy::new(2, Duration::from_millis(100)),
        );
        assert!(client.fetch("https://example.com").await.is_err());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));
        let d1 = policy.delay_for(1);
        assert!(d1 >= Duration::from_secs(1) && d1 <= Duration::from_millis(1250));
        let d9 = policy.delay_for(9);
        assert!(d9 <= Duration::from_millis(30_250));
    }
}
