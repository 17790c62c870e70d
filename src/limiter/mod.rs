//! Fixed-window admission control over a shared counter store.
//!
//! The [`RateLimiter`] owns the check-increment-block decision and talks to
//! the store only through [`StorageStrategy`], so the same algorithm runs over
//! Redis in production and over [`InMemoryStrategy`] in tests.

mod memory_store;
mod rate_limiter;
mod redis_store;
mod strategy;

pub use memory_store::InMemoryStrategy;
pub use rate_limiter::{CheckResult, LimitConfig, RateLimiter, WINDOW};
pub use redis_store::RedisStrategy;
pub use strategy::{Increment, StorageStrategy};
