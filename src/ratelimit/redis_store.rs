//! Redis-backed window store.
//!
//! Each window key maps to one sorted set. A hit is stored with its
//! millisecond epoch timestamp as both the score and the member, so two hits
//! on the same key within the same millisecond collapse into one.
//!
//! Purge, count and add are issued as independent commands. They are never
//! wrapped in a transaction, so concurrent checks on the same key may
//! interleave.
//!
//! Commands run on a [`ConnectionManager`]. When the connection drops, the
//! failing command returns an error and the manager reconnects for the
//! commands that follow.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ConnectionInfo, IntoConnectionInfo};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use super::store::{StoreResult, WindowStore};

/// Window store shared by every instance pointing at the same Redis database.
pub struct RedisWindowStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
}

impl fmt::Debug for RedisWindowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.client.get_connection_info();
        f.debug_struct("RedisWindowStore")
            .field("addr", &info.addr)
            .field("db", &info.redis.db)
            .finish_non_exhaustive()
    }
}

impl RedisWindowStore {
    /// Build a store for the given connection parameters.
    ///
    /// No connection is made until the first operation.
    pub fn new(info: impl IntoConnectionInfo) -> StoreResult<Self> {
        let info: ConnectionInfo = info.into_connection_info()?;
        Ok(Self {
            client: Client::open(info)?,
            connection: OnceCell::new(),
        })
    }

    /// Database index this store writes to.
    pub fn db(&self) -> i64 {
        self.client.get_connection_info().redis.db
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                debug!(addr = %self.client.get_connection_info().addr, "Connecting to Redis");
                ConnectionManager::new(self.client.clone()).await
            })
            .await?;
        Ok(manager.clone())
    }
}

/// Sorted-set score of a timestamp.
fn score(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Exclusive upper bound for a score range.
fn below(at: DateTime<Utc>) -> String {
    format!("({}", score(at))
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn add(&self, key: &str, at: DateTime<Utc>, expire_in: Duration) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let member = score(at);

        let mut pipe = redis::pipe();
        pipe.zadd(key, member, member).ignore();
        let ttl_ms = i64::try_from(expire_in.as_millis()).unwrap_or(i64::MAX);
        if ttl_ms > 0 {
            pipe.pexpire(key, ttl_ms).ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;

        trace!(key = %key, score = member, "Recorded hit in Redis");
        Ok(())
    }

    async fn purge(&self, key: &str, until: DateTime<Utc>) -> StoreResult<usize> {
        let mut conn = self.connection().await?;
        let removed: Option<usize> = conn.zrembyscore(key, "-inf", below(until)).await?;
        Ok(removed.unwrap_or(0))
    }

    async fn count(&self, key: &str, until: DateTime<Utc>) -> StoreResult<usize> {
        let mut conn = self.connection().await?;
        let hits: Option<usize> = conn.zcount(key, "-inf", score(until)).await?;
        Ok(hits.unwrap_or(0))
    }

    async fn flush(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("FLUSHDB").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
