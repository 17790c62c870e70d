use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Outcome of an atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    /// Counter value after this increment.
    pub count: i64,
    /// Whether the counter held at least 1 before this increment.
    pub existed: bool,
}

impl Increment {
    pub fn from_count(count: i64) -> Self {
        Self {
            count,
            existed: count > 1,
        }
    }
}

/// Capability set the rate limiter needs from a counter store.
///
/// Counter operations (`get`, `set`, `increment`) take the store key as is.
/// Block operations (`is_blocked`, `block`) take the identity key and derive
/// the block key themselves. Every operation is cancelled by dropping its
/// future; backends must also bound each call with their own timeout and
/// report it as [`StoreError::Unavailable`].
#[async_trait]
pub trait StorageStrategy: Send + Sync {
    /// Current counter value, 0 if absent.
    async fn get(&self, key: &str) -> Result<i64, StoreError>;

    /// Unconditional overwrite. A zero `ttl` leaves the key absent.
    async fn set(&self, key: &str, count: i64, ttl: Duration) -> Result<(), StoreError>;

    /// Increments the counter and reapplies `ttl` as one indivisible step.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<Increment, StoreError>;

    async fn is_blocked(&self, key: &str) -> Result<bool, StoreError>;

    /// Creates or refreshes the block record. A zero `duration` creates none.
    async fn block(&self, key: &str, duration: Duration) -> Result<(), StoreError>;

    /// Integer counters under `prefix`. Non-integer values are skipped.
    async fn snapshot(&self, prefix: &str) -> Result<BTreeMap<String, i64>, StoreError>;
}
