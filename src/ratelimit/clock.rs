//! Time source for the limiter.

use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
///
/// Hits are persisted as wall-clock timestamps so they stay meaningful across
/// processes sharing the same store.
pub trait Clock: Send + Sync + Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation using `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub use mock::MockClock;
