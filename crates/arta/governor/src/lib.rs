//! Request governor: token buckets and deadlines.
//!
//! Buckets are keyed `{route_class}:{user_id}:{remote_addr}` and live in a
//! process-local table behind the [`RateLimiter`] type; the table is the
//! only state, so a distributed counter can replace it without touching
//! callers. Deadlines are explicit: [`RequestDeadline`] owns a
//! `CancellationToken` that fires when the per-request budget elapses, and
//! every downstream I/O call selects against that token.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Route classes with independent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Chat,
    InsightsCompute,
    Simulate,
    UploadCsv,
    Preferences,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Chat => "chat",
            RouteClass::InsightsCompute => "insights.compute",
            RouteClass::Simulate => "simulate",
            RouteClass::UploadCsv => "upload-csv",
            RouteClass::Preferences => "preferences",
        }
    }

    /// Default budget: requests per minute.
    fn default_per_minute(&self) -> u32 {
        match self {
            RouteClass::Chat => 10,
            RouteClass::InsightsCompute => 6,
            RouteClass::Simulate => 5,
            RouteClass::UploadCsv => 3,
            RouteClass::Preferences => 10,
        }
    }
}

/// Raised when a bucket is exhausted; `retry_after` is the wait hint in
/// whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded, retry after {retry_after}s")]
pub struct RateLimited {
    pub retry_after: u64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    capacity: f64,
    refill_per_sec: f64,
}

/// Process-local token-bucket limiter.
pub struct RateLimiter {
    rules: HashMap<RouteClass, Rule>,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        let mut rules = HashMap::new();
        for class in [
            RouteClass::Chat,
            RouteClass::InsightsCompute,
            RouteClass::Simulate,
            RouteClass::UploadCsv,
            RouteClass::Preferences,
        ] {
            let per_minute = class.default_per_minute() as f64;
            rules.insert(
                class,
                Rule {
                    capacity: per_minute,
                    refill_per_sec: per_minute / 60.0,
                },
            );
        }
        Self {
            rules,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Override one class's budget (requests per minute).
    pub fn with_limit(mut self, class: RouteClass, per_minute: u32) -> Self {
        self.rules.insert(
            class,
            Rule {
                capacity: per_minute as f64,
                refill_per_sec: per_minute as f64 / 60.0,
            },
        );
        self
    }

    /// Take one token for the identity, or report how long to wait.
    pub fn check(
        &self,
        class: RouteClass,
        user_id: &str,
        remote_addr: &str,
    ) -> Result<(), RateLimited> {
        self.check_at(class, user_id, remote_addr, Instant::now())
    }

    /// Clock-injected variant used by tests.
    pub fn check_at(
        &self,
        class: RouteClass,
        user_id: &str,
        remote_addr: &str,
        now: Instant,
    ) -> Result<(), RateLimited> {
        let rule = self.rules[&class];
        let key = format!("{}:{}:{}", class.as_str(), user_id, remote_addr);

        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            // A poisoned limiter table fails open rather than refusing
            // every request.
            Err(poisoned) => poisoned.into_inner(),
        };
        let bucket = buckets.entry(key).or_insert(Bucket {
            tokens: rule.capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * rule.refill_per_sec).min(rule.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            let retry_after = (deficit / rule.refill_per_sec).ceil() as u64;
            Err(RateLimited {
                retry_after: retry_after.max(1),
            })
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Default per-request time budget.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// A per-request deadline bound to a cancellation token.
///
/// Dropping the deadline aborts the watchdog; the token also cancels when
/// the budget elapses, which every suspension point observes.
pub struct RequestDeadline {
    token: CancellationToken,
    watchdog: tokio::task::JoinHandle<()>,
}

impl RequestDeadline {
    pub fn start(budget: Duration) -> Self {
        let token = CancellationToken::new();
        let armed = token.clone();
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            tracing::debug!(budget_ms = budget.as_millis() as u64, "request deadline fired");
            armed.cancel();
        });
        Self { token, watchdog }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RequestDeadline {
    fn drop(&mut self) {
        self.watchdog.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_allows_burst_then_limits() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..10 {
            limiter
                .check_at(RouteClass::Chat, "user-1", "10.0.0.1", now)
                .expect("burst within capacity");
        }
        let err = limiter
            .check_at(RouteClass::Chat, "user-1", "10.0.0.1", now)
            .unwrap_err();
        assert!(err.retry_after >= 1);
    }

    #[test]
    fn buckets_are_isolated_per_identity() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..10 {
            limiter
                .check_at(RouteClass::Chat, "user-1", "10.0.0.1", now)
                .unwrap();
        }
        // Other user, other address, other class: all unaffected.
        assert!(limiter
            .check_at(RouteClass::Chat, "user-2", "10.0.0.1", now)
            .is_ok());
        assert!(limiter
            .check_at(RouteClass::Chat, "user-1", "10.0.0.2", now)
            .is_ok());
        assert!(limiter
            .check_at(RouteClass::Simulate, "user-1", "10.0.0.1", now)
            .is_ok());
    }

    #[test]
    fn tokens_refill_over_time() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..3 {
            limiter
                .check_at(RouteClass::UploadCsv, "user-1", "addr", start)
                .unwrap();
        }
        limiter
            .check_at(RouteClass::UploadCsv, "user-1", "addr", start)
            .unwrap_err();

        // 3/min refills one token every 20 seconds.
        let later = start + Duration::from_secs(21);
        assert!(limiter
            .check_at(RouteClass::UploadCsv, "user-1", "addr", later)
            .is_ok());
    }

    #[test]
    fn retry_after_reflects_refill_rate() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..3 {
            limiter
                .check_at(RouteClass::UploadCsv, "user-1", "addr", now)
                .unwrap();
        }
        let err = limiter
            .check_at(RouteClass::UploadCsv, "user-1", "addr", now)
            .unwrap_err();
        assert_eq!(err.retry_after, 20);
    }

    #[tokio::test]
    async fn deadline_cancels_after_budget() {
        let deadline = RequestDeadline::start(Duration::from_millis(20));
        let token = deadline.token();
        assert!(!token.is_cancelled());
        token.cancelled().await;
        assert!(deadline.is_expired());
    }

    #[tokio::test]
    async fn dropping_deadline_disarms_watchdog() {
        let deadline = RequestDeadline::start(Duration::from_millis(10));
        let token = deadline.token();
        drop(deadline);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!token.is_cancelled());
    }
}
