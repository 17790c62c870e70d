use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::RedisResult;
use redis::aio::MultiplexedConnection;

use super::strategy::{Increment, StorageStrategy};
use crate::cache::keys::block_key;
use crate::error::StoreError;

const BLOCK_MARKER: &str = "blocked";
const SCAN_BATCH: usize = 100;

/// Redis-backed strategy shared by every service instance.
///
/// The multiplexed connection is cloned per call; clones share one socket.
/// Each command is bounded by `timeout`.
#[derive(Clone)]
pub struct RedisStrategy {
    conn: MultiplexedConnection,
    timeout: Duration,
}

impl RedisStrategy {
    pub fn new(conn: MultiplexedConnection, timeout: Duration) -> Self {
        Self { conn, timeout }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        Ok(tokio::time::timeout(self.timeout, fut).await??)
    }

    async fn read_counter(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("GET").arg(key).to_owned();
        self.bounded(cmd.query_async(&mut conn)).await
    }
}

fn parse_count(key: &str, raw: String) -> Result<i64, StoreError> {
    raw.parse::<i64>().map_err(|_| StoreError::CorruptState {
        key: key.to_string(),
        value: raw,
    })
}

fn millis(d: Duration) -> u64 {
    (d.as_millis() as u64).max(1)
}

fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

#[async_trait]
impl StorageStrategy for RedisStrategy {
    async fn get(&self, key: &str) -> Result<i64, StoreError> {
        match self.read_counter(key).await? {
            Some(raw) => parse_count(key, raw),
            None => Ok(0),
        }
    }

    async fn set(&self, key: &str, count: i64, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let cmd = if ttl.is_zero() {
            redis::cmd("DEL").arg(key).to_owned()
        } else {
            redis::cmd("SET")
                .arg(key)
                .arg(count)
                .arg("PX")
                .arg(millis(ttl))
                .to_owned()
        };
        let _: () = self.bounded(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<Increment, StoreError> {
        let mut conn = self.conn.clone();

        // MULTI/EXEC so no other client can observe the counter between the
        // increment and the expiry refresh.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .ignore();

        let (count,): (i64,) = self.bounded(pipe.query_async(&mut conn)).await?;
        Ok(Increment::from_count(count))
    }

    async fn is_blocked(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("EXISTS").arg(block_key(key)).to_owned();
        let exists: i64 = self.bounded(cmd.query_async(&mut conn)).await?;
        Ok(exists > 0)
    }

    async fn block(&self, key: &str, duration: Duration) -> Result<(), StoreError> {
        if duration.is_zero() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("SET")
            .arg(block_key(key))
            .arg(BLOCK_MARKER)
            .arg("PX")
            .arg(millis(duration))
            .to_owned();
        let _: () = self.bounded(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn snapshot(&self, prefix: &str) -> Result<BTreeMap<String, i64>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = glob_escape(prefix);
        let mut counters = BTreeMap::new();
        let mut cursor: u64 = 0;

        loop {
            let cmd = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .to_owned();
            let (next, batch): (u64, Vec<String>) =
                self.bounded(cmd.query_async(&mut conn)).await?;

            if !batch.is_empty() {
                let cmd = redis::cmd("MGET").arg(&batch).to_owned();
                let values: Vec<Option<String>> =
                    self.bounded(cmd.query_async(&mut conn)).await?;
                collect_counters(&mut counters, batch, values);
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(counters)
    }
}

/// Pairs scanned keys with their `MGET` values. Keys that expired since the
/// scan, or whose value is not an integer, are left out.
fn collect_counters(
    counters: &mut BTreeMap<String, i64>,
    keys: Vec<String>,
    values: Vec<Option<String>>,
) {
    for (key, value) in keys.into_iter().zip(values) {
        if let Some(count) = value.and_then(|raw| raw.parse::<i64>().ok()) {
            counters.insert(key, count);
        }
    }
}
