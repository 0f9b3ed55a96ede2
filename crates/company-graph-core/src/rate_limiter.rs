//! Per-source rate limiting for external API calls.
//!
//! Every outbound request goes through the limiter for its source; the
//! limiter is the sole arbiter of request pacing. Limiters enforce a
//! minimum inter-call interval of `1 / rate_per_second` with single-token
//! semantics and live in a process-wide registry so all pipeline stages
//! share the same pacing state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::Quota;
use nonzero_ext::nonzero;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::{AppError, AppResult};

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Interval rate limiter for a single external source.
pub struct RateLimiter {
    limiter: DirectLimiter,
    source_name: String,
    requests_per_second: f64,
}

impl RateLimiter {
    /// Create a limiter enforcing `requests_per_second` with burst 1.
    pub fn new(requests_per_second: f64, source_name: &str) -> AppResult<Self> {
        if requests_per_second <= 0.0 {
            return Err(AppError::ValidationError(format!(
                "requests_per_second must be > 0, got {requests_per_second}"
            )));
        }
        let period = Duration::from_secs_f64(1.0 / requests_per_second);
        let quota = Quota::with_period(period)
            .ok_or_else(|| {
                AppError::ValidationError(format!(
                    "invalid rate limiter period for {source_name}"
                ))
            })?
            .allow_burst(nonzero!(1u32));

        Ok(Self {
            limiter: governor::RateLimiter::direct(quota),
            source_name: source_name.to_string(),
            requests_per_second,
        })
    }

    /// Wait until the next request slot is available.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
        debug!(source = %self.source_name, "rate limit permit granted");
    }

    /// Try to take a slot without waiting.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn requests_per_second(&self) -> f64 {
        self.requests_per_second
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }
}

static REGISTRY: Lazy<Mutex<HashMap<String, Arc<RateLimiter>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Get or create the process-wide limiter for a source.
///
/// The first caller fixes the rate; later callers receive the existing
/// limiter regardless of the rate they pass, so the pacing state survives
/// across pipeline stages.
pub fn limiter_for(source_name: &str, requests_per_second: f64) -> AppResult<Arc<RateLimiter>> {
    let mut registry = REGISTRY
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(existing) = registry.get(source_name) {
        return Ok(existing.clone());
    }
    let limiter = Arc::new(RateLimiter::new(requests_per_second, source_name)?);
    registry.insert(source_name.to_string(), limiter.clone());
    Ok(limiter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn rejects_non_positive_rate() {
        assert!(RateLimiter::new(0.0, "bad").is_err());
        assert!(RateLimiter::new(-1.0, "bad").is_err());
    }

    #[tokio::test]
    async fn enforces_minimum_interval() {
        let limiter = RateLimiter::new(10.0, "test_interval").unwrap();
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        // Three calls at 10/s: the second and third each wait ~100ms.
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn first_call_does_not_wait() {
        let limiter = RateLimiter::new(1.0, "test_first").unwrap();
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn try_acquire_reports_exhaustion() {
        let limiter = RateLimiter::new(1.0, "test_try").unwrap();
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn registry_returns_the_same_instance() {
        let a = limiter_for("registry_source", 5.0).unwrap();
        let b = limiter_for("registry_source", 50.0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        // The first registration wins.
        assert_eq!(b.requests_per_second(), 5.0);
    }

    #[tokio::test]
    async fn concurrent_acquire_is_serialized() {
        let limiter = Arc::new(RateLimiter::new(5.0, "test_concurrent").unwrap());
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        // 5 permits at 5/s with burst 1: four waits of ~200ms each.
        assert!(start.elapsed() >= Duration::from_millis(700));
    }
}
