//! Rate limiting logic and hit storage.

mod clock;
mod factory;
mod key;
mod limit;
mod limiter;
mod memory;
mod redis_store;
mod store;

pub use clock::{Clock, SystemClock};
pub use factory::{store_from_dsn, store_from_dsn_with, StoreOptions};
pub use key::WindowKey;
pub use limit::{Frequency, Limit, LimitError};
pub use limiter::{Decision, HitRecording, Limiter, SlidingWindowLimiter};
pub use memory::InMemoryWindowStore;
pub use redis_store::RedisWindowStore;
pub use store::{StoreError, StoreResult, WindowStore};
