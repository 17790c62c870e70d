use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::strategy::{Increment, StorageStrategy};
use crate::cache::keys::block_key;
use crate::error::StoreError;

const BLOCK_MARKER: &str = "blocked";

#[derive(Debug, Clone)]
enum Value {
    Count(i64),
    Marker,
}

#[derive(Debug, Clone)]
struct Record {
    value: Value,
    expires_at: Instant,
}

impl Record {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Single-process store for tests and local runs.
///
/// Each key lives in one map entry and every mutation goes through the
/// entry's exclusive guard, so concurrent increments of one key are
/// linearized while different keys proceed independently. Expiry follows
/// `tokio::time`, which lets paused-clock tests advance past TTLs.
#[derive(Debug, Default)]
pub struct InMemoryStrategy {
    records: DashMap<String, Record>,
}

impl InMemoryStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes a record outright, as an operator would with `DEL`.
    pub fn remove(&self, key: &str) -> bool {
        self.records.remove(key).is_some()
    }

    /// Number of records that have not yet expired.
    pub fn live_records(&self) -> usize {
        let now = Instant::now();
        self.records.iter().filter(|r| r.is_live(now)).count()
    }

    fn live(&self, key: &str) -> Option<Record> {
        let now = Instant::now();
        let record = self.records.get(key).map(|r| r.clone())?;
        if record.is_live(now) {
            Some(record)
        } else {
            self.records.remove_if(key, |_, r| !r.is_live(now));
            None
        }
    }
}

#[async_trait]
impl StorageStrategy for InMemoryStrategy {
    async fn get(&self, key: &str) -> Result<i64, StoreError> {
        match self.live(key).map(|r| r.value) {
            Some(Value::Count(count)) => Ok(count),
            Some(Value::Marker) => Err(StoreError::CorruptState {
                key: key.to_string(),
                value: BLOCK_MARKER.to_string(),
            }),
            None => Ok(0),
        }
    }

    async fn set(&self, key: &str, count: i64, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            self.records.remove(key);
        } else {
            self.records
                .insert(key.to_string(), Record::new(Value::Count(count), ttl));
        }
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<Increment, StoreError> {
        let now = Instant::now();
        let count = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                let previous = if record.is_live(now) {
                    match record.value {
                        Value::Count(count) => count,
                        Value::Marker => {
                            return Err(StoreError::CorruptState {
                                key: key.to_string(),
                                value: BLOCK_MARKER.to_string(),
                            });
                        }
                    }
                } else {
                    0
                };
                *record = Record::new(Value::Count(previous + 1), ttl);
                previous + 1
            }
            Entry::Vacant(entry) => {
                entry.insert(Record::new(Value::Count(1), ttl));
                1
            }
        };

        Ok(Increment::from_count(count))
    }

    async fn is_blocked(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.live(&block_key(key)).is_some())
    }

    async fn block(&self, key: &str, duration: Duration) -> Result<(), StoreError> {
        if duration.is_zero() {
            return Ok(());
        }
        self.records
            .insert(block_key(key), Record::new(Value::Marker, duration));
        Ok(())
    }

    async fn snapshot(&self, prefix: &str) -> Result<BTreeMap<String, i64>, StoreError> {
        let now = Instant::now();
        Ok(self
            .records
            .iter()
            .filter(|r| r.key().starts_with(prefix) && r.is_live(now))
            .filter_map(|r| match r.value {
                Value::Count(count) => Some((r.key().clone(), count)),
                Value::Marker => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_zero_for_missing_key() {
        let store = InMemoryStrategy::new();
        assert_eq!(store.get("rate:missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn increment_creates_then_counts() {
        let store = InMemoryStrategy::new();

        let first = store.increment("rate:a", Duration::from_secs(1)).await.unwrap();
        assert_eq!(first, Increment { count: 1, existed: false });

        let second = store.increment("rate:a", Duration::from_secs(1)).await.unwrap();
        assert_eq!(second, Increment { count: 2, existed: true });
        assert_eq!(store.get("rate:a").await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn counter_expires_after_ttl() {
        let store = InMemoryStrategy::new();
        store.increment("rate:a", Duration::from_secs(1)).await.unwrap();

        tokio::time::advance(Duration::from_millis(1001)).await;

        assert_eq!(store.get("rate:a").await.unwrap(), 0);
        let next = store.increment("rate:a", Duration::from_secs(1)).await.unwrap();
        assert_eq!(next, Increment { count: 1, existed: false });
    }

    #[tokio::test(start_paused = true)]
    async fn increment_refreshes_ttl() {
        let store = InMemoryStrategy::new();
        store.increment("rate:a", Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_millis(800)).await;
        store.increment("rate:a", Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_millis(800)).await;

        assert_eq!(store.get("rate:a").await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_with_expiry() {
        let store = InMemoryStrategy::new();
        store.increment("rate:a", Duration::from_secs(1)).await.unwrap();
        store.set("rate:a", 7, Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("rate:a").await.unwrap(), 7);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.get("rate:a").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reblocking_refreshes_expiry() {
        let store = InMemoryStrategy::new();
        store.block("ip:1.2.3.4", Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.is_blocked("ip:1.2.3.4").await.unwrap());

        store.block("ip:1.2.3.4", Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.is_blocked("ip:1.2.3.4").await.unwrap());
        assert_eq!(store.live_records(), 1);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!store.is_blocked("ip:1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn zero_block_duration_creates_no_record() {
        let store = InMemoryStrategy::new();
        store.block("ip:1.2.3.4", Duration::ZERO).await.unwrap();
        assert!(!store.is_blocked("ip:1.2.3.4").await.unwrap());
        assert_eq!(store.live_records(), 0);
    }

    #[tokio::test]
    async fn removed_block_is_lifted() {
        let store = InMemoryStrategy::new();
        store.block("token:abc", Duration::from_secs(60)).await.unwrap();
        assert!(store.remove("block:token:abc"));
        assert!(!store.is_blocked("token:abc").await.unwrap());
    }

    #[tokio::test]
    async fn block_marker_is_not_a_counter() {
        let store = InMemoryStrategy::new();
        store.block("ip:a", Duration::from_secs(60)).await.unwrap();

        assert!(matches!(
            store.get("block:ip:a").await,
            Err(StoreError::CorruptState { .. })
        ));
    }

    #[tokio::test]
    async fn snapshot_lists_counters_under_prefix() {
        let store = InMemoryStrategy::new();
        store.increment("rate:ip:a", Duration::from_secs(1)).await.unwrap();
        store.increment("rate:ip:a", Duration::from_secs(1)).await.unwrap();
        store.increment("rate:token:t", Duration::from_secs(1)).await.unwrap();
        store.block("ip:a", Duration::from_secs(60)).await.unwrap();

        let all = store.snapshot("rate:").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["rate:ip:a"], 2);

        let tokens = store.snapshot("rate:token:").await.unwrap();
        assert_eq!(tokens.into_iter().collect::<Vec<_>>(), vec![("rate:token:t".to_string(), 1)]);

        assert!(store.snapshot("block:").await.unwrap().is_empty());
    }
}
