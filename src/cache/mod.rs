//! Redis bootstrap and the key layout shared by every store backend.

pub mod keys;

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use tokio::time::timeout;

use crate::config::Config;
use crate::error::StoreError;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a multiplexed connection and checks it with `PING`.
pub async fn connect(config: &Config) -> Result<MultiplexedConnection, StoreError> {
    let client = redis::Client::open(config.redis_url.as_str())?;
    let mut conn = timeout(DIAL_TIMEOUT, client.get_multiplexed_async_connection()).await??;

    let pong: String = timeout(DIAL_TIMEOUT, redis::cmd("PING").query_async(&mut conn)).await??;
    tracing::info!(reply = %pong, "Connected to Redis");

    Ok(conn)
}
