//! Process-local window store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use super::store::{StoreResult, WindowStore};

type Hits = Vec<DateTime<Utc>>;

/// Backing map of an in-memory store.
#[derive(Debug)]
enum HitMap {
    /// One lock for the whole store, held for the duration of each operation.
    Guarded(Mutex<HashMap<String, Hits>>),
    /// Per-shard locking; operations on different keys rarely contend.
    Sharded(DashMap<String, Hits>),
}

/// Window store keeping hit timestamps in process memory.
///
/// Meant for tests and single-instance development setups. There is no TTL:
/// hits live until they are purged or the store is flushed. Each key's hits
/// are kept sorted by time.
///
/// No lock is ever held across an await point, so a cancelled check cannot
/// leave the store locked.
#[derive(Debug)]
pub struct InMemoryWindowStore {
    hits: HitMap,
}

impl InMemoryWindowStore {
    /// Create an empty store with per-shard locking.
    pub fn new() -> Self {
        Self {
            hits: HitMap::Sharded(DashMap::new()),
        }
    }

    /// Create an empty store where every operation takes a single store-wide lock.
    pub fn safe() -> Self {
        Self {
            hits: HitMap::Guarded(Mutex::new(HashMap::new())),
        }
    }

    /// Create a store seeded with existing hits.
    pub fn with_hits(hits: HashMap<String, Vec<DateTime<Utc>>>, safe: bool) -> Self {
        let hits = hits.into_iter().map(|(key, mut timestamps)| {
            timestamps.sort_unstable();
            (key, timestamps)
        });

        let hits = if safe {
            HitMap::Guarded(Mutex::new(hits.collect()))
        } else {
            HitMap::Sharded(hits.collect())
        };

        Self { hits }
    }

    /// Whether this store serializes all operations behind one lock.
    pub fn is_safe(&self) -> bool {
        matches!(self.hits, HitMap::Guarded(_))
    }

    /// Number of keys currently holding at least one hit.
    pub fn key_count(&self) -> usize {
        match &self.hits {
            HitMap::Guarded(map) => map.lock().len(),
            HitMap::Sharded(map) => map.len(),
        }
    }

    /// Run `f` against the hit list of `key`, creating it if needed.
    fn with_entry<R>(&self, key: &str, f: impl FnOnce(&mut Hits) -> R) -> R {
        match &self.hits {
            HitMap::Guarded(map) => f(map.lock().entry(key.to_string()).or_default()),
            HitMap::Sharded(map) => f(map.entry(key.to_string()).or_default().value_mut()),
        }
    }

    /// Run `f` against the hit list of `key` if it exists, dropping the key once empty.
    fn with_existing<R>(&self, key: &str, f: impl FnOnce(&mut Hits) -> R) -> Option<R> {
        match &self.hits {
            HitMap::Guarded(map) => {
                let mut map = map.lock();
                let hits = map.get_mut(key)?;
                let result = f(hits);
                if hits.is_empty() {
                    map.remove(key);
                }
                Some(result)
            }
            HitMap::Sharded(map) => {
                let result = {
                    let mut hits = map.get_mut(key)?;
                    f(hits.value_mut())
                };
                map.remove_if(key, |_, hits| hits.is_empty());
                Some(result)
            }
        }
    }

    fn read<R>(&self, key: &str, f: impl FnOnce(&Hits) -> R) -> Option<R> {
        match &self.hits {
            HitMap::Guarded(map) => map.lock().get(key).map(f),
            HitMap::Sharded(map) => map.get(key).map(|hits| f(hits.value())),
        }
    }
}

impl Default for InMemoryWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn add(&self, key: &str, at: DateTime<Utc>, _expire_in: Duration) -> StoreResult<()> {
        self.with_entry(key, |hits| {
            let position = hits.partition_point(|t| *t <= at);
            hits.insert(position, at);
        });
        trace!(key = %key, at = %at, "Recorded hit in memory");
        Ok(())
    }

    async fn purge(&self, key: &str, until: DateTime<Utc>) -> StoreResult<usize> {
        let removed = self
            .with_existing(key, |hits| {
                let expired = hits.partition_point(|t| *t < until);
                hits.drain(..expired);
                expired
            })
            .unwrap_or(0);
        Ok(removed)
    }

    async fn count(&self, key: &str, until: DateTime<Utc>) -> StoreResult<usize> {
        Ok(self
            .read(key, |hits| hits.partition_point(|t| *t <= until))
            .unwrap_or(0))
    }

    async fn flush(&self) -> StoreResult<()> {
        match &self.hits {
            HitMap::Guarded(map) => map.lock().clear(),
            HitMap::Sharded(map) => map.clear(),
        }
        Ok(())
    }
}
