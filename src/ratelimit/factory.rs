//! Window store selection from a connection descriptor.

use std::sync::Arc;

use tracing::info;

use super::memory::InMemoryWindowStore;
use super::redis_store::RedisWindowStore;
use super::store::{StoreError, StoreResult, WindowStore};

/// Options that only apply to some backends.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Serialize every in-memory operation behind a single store-wide lock.
    pub memory_safe: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { memory_safe: true }
    }
}

/// Build a window store from a descriptor such as `redis://localhost:6379/0`
/// or `inmemory://`.
pub fn store_from_dsn(dsn: &str) -> StoreResult<Arc<dyn WindowStore>> {
    store_from_dsn_with(dsn, StoreOptions::default())
}

/// Build a window store from a descriptor with explicit options.
pub fn store_from_dsn_with(dsn: &str, options: StoreOptions) -> StoreResult<Arc<dyn WindowStore>> {
    let (scheme, _) = dsn
        .split_once("://")
        .ok_or_else(|| StoreError::InvalidDescriptor(dsn.to_string()))?;

    match scheme.to_ascii_lowercase().as_str() {
        "redis" => {
            let store = RedisWindowStore::new(dsn)?;
            info!(store = ?store, "Using Redis window store");
            Ok(Arc::new(store))
        }
        "inmemory" => {
            let store = if options.memory_safe {
                InMemoryWindowStore::safe()
            } else {
                InMemoryWindowStore::new()
            };
            info!(safe = store.is_safe(), "Using in-memory window store");
            Ok(Arc::new(store))
        }
        other => Err(StoreError::Unsupported(other.to_string())),
    }
}
