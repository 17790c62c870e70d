use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::strategy::StorageStrategy;
use crate::cache::keys::counting_key;
use crate::error::StoreError;

/// Length of one counting window.
pub const WINDOW: Duration = Duration::from_secs(1);

fn after(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|span| now.checked_add_signed(span))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Limit applied to one class of identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    pub requests_per_second: u32,
    /// How long an identity stays rejected after overflowing a window.
    pub block_duration: Duration,
}

impl LimitConfig {
    pub const fn new(requests_per_second: u32, block_duration: Duration) -> Self {
        Self {
            requests_per_second,
            block_duration,
        }
    }

    /// Whole seconds a rejected client should wait before retrying.
    ///
    /// Never less than one window, rounded up so a retry cannot land inside
    /// the block or the window that tripped it.
    pub fn retry_after_secs(&self) -> u64 {
        let wait = self.block_duration.max(WINDOW);
        wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
    }
}

/// Verdict for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    /// True only when a block record already existed before this call.
    pub blocked: bool,
}

/// Fixed-window limiter with a blocking period triggered on first overflow.
///
/// Holds no mutable state of its own; every decision is a function of the
/// store contents and the supplied [`LimitConfig`], so clones can be shared
/// freely across request tasks and service instances.
#[derive(Clone)]
pub struct RateLimiter {
    storage: Arc<dyn StorageStrategy>,
}

impl RateLimiter {
    pub fn new(storage: Arc<dyn StorageStrategy>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn StorageStrategy> {
        &self.storage
    }

    /// Admits or rejects one request for `key`.
    ///
    /// Costs one store round trip while blocked, two otherwise, plus one more
    /// on the request that trips the block. Store failures are returned
    /// untouched; whether to fail open or closed is the caller's call.
    pub async fn check(&self, key: &str, config: &LimitConfig) -> Result<CheckResult, StoreError> {
        let now = Utc::now();

        if self.storage.is_blocked(key).await? {
            debug!(key, "Rejected blocked identity");
            return Ok(CheckResult {
                allowed: false,
                remaining: 0,
                reset_time: after(now, config.block_duration),
                blocked: true,
            });
        }

        let increment = self.storage.increment(&counting_key(key), WINDOW).await?;
        if !increment.existed {
            debug!(key, "Opened new window");
        }

        let count = increment.count.max(0) as u64;
        let limit = u64::from(config.requests_per_second);
        let reset_time = after(now, WINDOW);

        if count > limit {
            self.storage.block(key, config.block_duration).await?;
            warn!(
                key,
                count,
                limit,
                block_secs = config.block_duration.as_secs(),
                "Rate limit exceeded, identity blocked"
            );
            return Ok(CheckResult {
                allowed: false,
                remaining: 0,
                reset_time,
                blocked: false,
            });
        }

        let remaining = (limit - count) as u32;
        debug!(key, count, remaining, "Request admitted");

        Ok(CheckResult {
            allowed: true,
            remaining,
            reset_time,
            blocked: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::{InMemoryStrategy, Increment};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    fn limiter() -> (RateLimiter, Arc<InMemoryStrategy>) {
        let store = Arc::new(InMemoryStrategy::new());
        (RateLimiter::new(store.clone()), store)
    }

    #[tokio::test(start_paused = true)]
    async fn allows_up_to_limit_then_blocks() {
        let (limiter, _) = limiter();
        let config = LimitConfig::new(5, Duration::from_secs(10));
        let key = "ip:1.2.3.4";

        for expected in [4, 3, 2, 1, 0] {
            let result = limiter.check(key, &config).await.unwrap();
            assert!(result.allowed);
            assert!(!result.blocked);
            assert_eq!(result.remaining, expected);
        }

        let tripping = limiter.check(key, &config).await.unwrap();
        assert!(!tripping.allowed);
        assert!(!tripping.blocked);
        assert_eq!(tripping.remaining, 0);

        let rejected = limiter.check(key, &config).await.unwrap();
        assert!(!rejected.allowed);
        assert!(rejected.blocked);
        assert_eq!(rejected.remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stays_blocked_across_windows_until_block_expires() {
        let (limiter, store) = limiter();
        let config = LimitConfig::new(2, Duration::from_secs(10));
        let key = "ip:10.0.0.1";

        for _ in 0..3 {
            limiter.check(key, &config).await.unwrap();
        }

        for _ in 0..9 {
            tokio::time::advance(Duration::from_secs(1)).await;
            let result = limiter.check(key, &config).await.unwrap();
            assert!(result.blocked);
            assert!(!result.allowed);
        }
        // Blocked checks never touch the counter.
        assert_eq!(store.get("rate:ip:10.0.0.1").await.unwrap(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        let fresh = limiter.check(key, &config).await.unwrap();
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 1);
    }

    #[tokio::test]
    async fn deleting_block_starts_fresh_window() {
        let (limiter, store) = limiter();
        let config = LimitConfig::new(1, Duration::from_secs(60));
        let key = "token:abc";

        limiter.check(key, &config).await.unwrap();
        limiter.check(key, &config).await.unwrap();
        assert!(limiter.check(key, &config).await.unwrap().blocked);

        store.remove("block:token:abc");
        store.remove("rate:token:abc");

        let result = limiter.check(key, &config).await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.remaining, 0);
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let (limiter, store) = limiter();
        let config = LimitConfig::new(1, Duration::from_secs(60));

        limiter.check("ip:a", &config).await.unwrap();
        limiter.check("ip:a", &config).await.unwrap();
        assert!(store.is_blocked("ip:a").await.unwrap());

        assert!(!store.is_blocked("ip:b").await.unwrap());
        assert_eq!(store.get("rate:ip:b").await.unwrap(), 0);
        let other = limiter.check("ip:b", &config).await.unwrap();
        assert!(other.allowed);
        assert_eq!(other.remaining, 0);
    }

    #[tokio::test]
    async fn zero_block_duration_only_rejects_the_window() {
        let (limiter, _) = limiter();
        let config = LimitConfig::new(1, Duration::ZERO);

        assert!(limiter.check("ip:z", &config).await.unwrap().allowed);
        let over = limiter.check("ip:z", &config).await.unwrap();
        assert!(!over.allowed);
        assert!(!over.blocked);
        let again = limiter.check("ip:z", &config).await.unwrap();
        assert!(!again.allowed);
        assert!(!again.blocked);
    }

    #[test]
    fn retry_after_rounds_up_to_a_whole_window() {
        let secs = |ms| LimitConfig::new(1, Duration::from_millis(ms)).retry_after_secs();

        assert_eq!(secs(0), 1);
        assert_eq!(secs(500), 1);
        assert_eq!(secs(1000), 1);
        assert_eq!(secs(1500), 2);
        assert_eq!(secs(5000), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_block_is_over_by_retry_after() {
        let (limiter, _) = limiter();
        let config = LimitConfig::new(1, Duration::from_millis(500));

        assert!(limiter.check("ip:s", &config).await.unwrap().allowed);
        assert!(!limiter.check("ip:s", &config).await.unwrap().allowed);

        tokio::time::advance(Duration::from_secs(config.retry_after_secs())).await;
        assert!(limiter.check("ip:s", &config).await.unwrap().allowed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checks_admit_exactly_the_limit() {
        let (limiter, store) = limiter();
        let config = LimitConfig::new(10, Duration::from_secs(5));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check("ip:concurrent", &config).await })
            })
            .collect();

        let results = futures_util::future::join_all(handles).await;
        let allowed = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .filter(|r| r.allowed)
            .count();

        assert_eq!(allowed, 10);
        assert!(store.is_blocked("ip:concurrent").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_increments_observe_distinct_counts() {
        let store = Arc::new(InMemoryStrategy::new());

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment("rate:ip:x", WINDOW).await })
            })
            .collect();

        let mut counts: Vec<i64> = futures_util::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap().count)
            .collect();
        counts.sort_unstable();

        assert_eq!(counts, (1..=20).collect::<Vec<_>>());
    }

    struct UnreachableStore;

    #[async_trait]
    impl StorageStrategy for UnreachableStore {
        async fn get(&self, _: &str) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn set(&self, _: &str, _: i64, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn increment(&self, _: &str, _: Duration) -> Result<Increment, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn is_blocked(&self, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn block(&self, _: &str, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn snapshot(&self, _: &str) -> Result<BTreeMap<String, i64>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn store_errors_are_propagated() {
        let limiter = RateLimiter::new(Arc::new(UnreachableStore));
        let config = LimitConfig::new(10, Duration::from_secs(1));

        let err = limiter.check("ip:a", &config).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
