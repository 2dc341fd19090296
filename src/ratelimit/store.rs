//! Window store trait for abstracting process-local and shared hit storage.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by window stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend reported that there is nothing stored for the key.
    #[error("key not found")]
    NotFound,

    /// Transport or command failure in the Redis backend.
    #[error("redis error: {0}")]
    Backend(#[from] redis::RedisError),

    /// The store descriptor names a backend that does not exist.
    #[error("invalid window storage: unsupported scheme {0:?}")]
    Unsupported(String),

    /// The store descriptor could not be understood.
    #[error("invalid window storage descriptor: {0}")]
    InvalidDescriptor(String),
}

impl StoreError {
    /// Whether this error only means "nothing stored".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Result type alias for window store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Record of hit timestamps per key, with expiry-aware purge.
///
/// Every backend keeps the same boundary conventions: `purge` removes hits
/// strictly older than `until` (a hit exactly at `until` survives) while
/// `count` includes hits at or before `until`. Each individual operation is
/// atomic; a purge/count/add sequence issued by the limiter is not.
#[async_trait]
pub trait WindowStore: Send + Sync + std::fmt::Debug {
    /// Record one hit at `at`.
    ///
    /// `expire_in` lets the backend drop the whole key once it goes idle. A
    /// zero duration means no expiry.
    async fn add(&self, key: &str, at: DateTime<Utc>, expire_in: Duration) -> StoreResult<()>;

    /// Remove every hit strictly before `until`, returning how many went away.
    ///
    /// A missing key removes nothing.
    async fn purge(&self, key: &str, until: DateTime<Utc>) -> StoreResult<usize>;

    /// Number of hits stored for `key` at or before `until`.
    async fn count(&self, key: &str, until: DateTime<Utc>) -> StoreResult<usize>;

    /// Drop every key in the store.
    async fn flush(&self) -> StoreResult<()>;
}
