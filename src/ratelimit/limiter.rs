//! Sliding-window admission.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace, warn};

use super::clock::{Clock, SystemClock};
use super::key::WindowKey;
use super::limit::Limit;
use super::store::{StoreError, StoreResult, WindowStore};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The action is within the limit.
    Admitted,
    /// The owner already used its quota for this window.
    Denied,
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted)
    }
}

/// How the current attempt is recorded once the decision is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitRecording {
    /// Record the hit before answering. A single caller always sees its own
    /// previous hits.
    #[default]
    Synchronous,
    /// Record the hit on a background task and answer immediately. A
    /// concurrent check on the same key may not see the hit yet.
    Detached,
}

/// Trait for anything that can grant or deny an owner's action on a resource.
///
/// This lets the gRPC service work with the sliding-window limiter or with
/// test doubles.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Decide whether `owner` may act on `resource` under `limit`.
    ///
    /// An error always means the action must be denied.
    async fn check(&self, limit: &Limit, owner: &str, resource: &str) -> StoreResult<Decision>;
}

/// Limiter counting hits over a window that moves with every check.
///
/// Each check purges hits older than the window, counts what is left and
/// records the attempt, whether it is admitted or not.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    recording: HitRecording,
}

impl SlidingWindowLimiter {
    /// Create a limiter over `store` recording hits synchronously.
    pub fn new(store: Arc<dyn WindowStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock::new()),
            recording: HitRecording::default(),
        }
    }

    /// Choose how hits are recorded.
    pub fn with_recording(mut self, recording: HitRecording) -> Self {
        self.recording = recording;
        self
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Forget every recorded hit.
    pub async fn reset(&self) -> StoreResult<()> {
        self.store.flush().await
    }

    async fn record(&self, key: WindowKey, now: DateTime<Utc>, limit: &Limit) {
        match self.recording {
            HitRecording::Synchronous => {
                if let Err(e) = self.store.add(key.as_str(), now, limit.unit()).await {
                    warn!(key = %key, error = %e, "Failed to record hit");
                }
            }
            HitRecording::Detached => {
                let store = Arc::clone(&self.store);
                let expire_in = limit.unit();
                let _detached = tokio::spawn(async move {
                    if let Err(e) = store.add(key.as_str(), now, expire_in).await {
                        warn!(key = %key, error = %e, "Failed to record hit in background");
                    }
                });
            }
        }
    }
}

/// Start of the window ending at `now`.
fn window_start(now: DateTime<Utc>, limit: &Limit) -> DateTime<Utc> {
    TimeDelta::from_std(limit.unit())
        .ok()
        .and_then(|unit| now.checked_sub_signed(unit))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl Limiter for SlidingWindowLimiter {
    async fn check(&self, limit: &Limit, owner: &str, resource: &str) -> StoreResult<Decision> {
        let now = self.clock.now();
        let window_start = window_start(now, limit);
        let key = WindowKey::new(owner, resource);

        match self.store.purge(key.as_str(), window_start).await {
            Ok(removed) => trace!(key = %key, removed, "Purged hits outside the window"),
            Err(StoreError::NotFound) => {}
            Err(e) => warn!(key = %key, error = %e, "Failed to purge hits outside the window"),
        }

        let hits = match self.store.count(key.as_str(), now).await {
            Ok(hits) => hits,
            Err(StoreError::NotFound) => 0,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to count hits, denying");
                return Err(e);
            }
        };

        let decision = if (hits as u64) < limit.quantity() {
            Decision::Admitted
        } else {
            debug!(
                key = %key,
                hits,
                quantity = limit.quantity(),
                "Rate limit exceeded"
            );
            Decision::Denied
        };

        self.record(key, now, limit).await;

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::MockClock;
    use crate::ratelimit::limit::Frequency;
    use crate::ratelimit::memory::InMemoryWindowStore;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    fn limiter_at(store: Arc<dyn WindowStore>, clock: &MockClock) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(store).with_clock(Arc::new(clock.clone()))
    }

    fn seeded(key: &str, hits: Vec<DateTime<Utc>>) -> Arc<dyn WindowStore> {
        Arc::new(InMemoryWindowStore::with_hits(
            HashMap::from([(key.to_string(), hits)]),
            true,
        ))
    }

    #[tokio::test]
    async fn test_admits_exactly_quantity_checks() {
        for quantity in [1u64, 3, 10] {
            let clock = MockClock::new(Utc::now());
            let limiter = limiter_at(Arc::new(InMemoryWindowStore::new()), &clock);
            let limit = Limit::new(Frequency::Minute, quantity);

            for i in 0..quantity {
                let decision = limiter.check(&limit, "svc", "res1").await.unwrap();
                assert_eq!(decision, Decision::Admitted, "check {} of {}", i + 1, quantity);
                clock.advance(TimeDelta::milliseconds(1));
            }

            let decision = limiter.check(&limit, "svc", "res1").await.unwrap();
            assert_eq!(decision, Decision::Denied);
        }
    }

    #[tokio::test]
    async fn test_prior_hits_within_the_hour() {
        let now = Utc::now();
        let prior = vec![
            now - TimeDelta::hours(2),
            now - TimeDelta::minutes(45),
            now - TimeDelta::minutes(30),
            now - TimeDelta::seconds(15),
        ];
        let clock = MockClock::new(now);

        // 3 hits in the last hour, limit 3/hour
        let limiter = limiter_at(seeded("svc-res1", prior.clone()), &clock);
        let limit: Limit = "3/hour".parse().unwrap();
        assert_eq!(limiter.check(&limit, "svc", "res1").await.unwrap(), Decision::Denied);

        // Same history, limit 4/hour
        let limiter = limiter_at(seeded("svc-res1", prior), &clock);
        let limit: Limit = "4/hour".parse().unwrap();
        assert_eq!(limiter.check(&limit, "svc", "res1").await.unwrap(), Decision::Admitted);
    }

    #[tokio::test]
    async fn test_window_rollover_after_a_minute() {
        let now = Utc::now();
        let clock = MockClock::new(now);
        let limiter = limiter_at(seeded("svc-res1", vec![now - TimeDelta::seconds(45)]), &clock);
        let limit: Limit = "1/minute".parse().unwrap();

        assert_eq!(limiter.check(&limit, "svc", "res1").await.unwrap(), Decision::Denied);

        // Both the seeded hit and the denied attempt fall out of the window.
        clock.advance(TimeDelta::minutes(1) + TimeDelta::milliseconds(1));
        assert_eq!(limiter.check(&limit, "svc", "res1").await.unwrap(), Decision::Admitted);
    }

    #[tokio::test]
    async fn test_hit_just_outside_window_is_ignored() {
        let now = Utc::now();
        let clock = MockClock::new(now);
        let limit = Limit::new(Frequency::Minute, 1);
        let unit = TimeDelta::minutes(1);

        let limiter = limiter_at(
            seeded("svc-res1", vec![now - unit - TimeDelta::nanoseconds(1)]),
            &clock,
        );
        assert_eq!(limiter.check(&limit, "svc", "res1").await.unwrap(), Decision::Admitted);

        let limiter = limiter_at(
            seeded("svc-res1", vec![now - unit + TimeDelta::nanoseconds(1)]),
            &clock,
        );
        assert_eq!(limiter.check(&limit, "svc", "res1").await.unwrap(), Decision::Denied);
    }

    #[tokio::test]
    async fn test_hit_on_window_edge_is_counted() {
        let now = Utc::now();
        let clock = MockClock::new(now);
        let limit = Limit::new(Frequency::Minute, 1);

        let limiter = limiter_at(seeded("svc-res1", vec![now - TimeDelta::minutes(1)]), &clock);
        assert_eq!(limiter.check(&limit, "svc", "res1").await.unwrap(), Decision::Denied);
    }

    #[tokio::test]
    async fn test_denied_attempts_are_recorded() {
        let clock = MockClock::new(Utc::now());
        let store: Arc<dyn WindowStore> = Arc::new(InMemoryWindowStore::new());
        let limiter = limiter_at(Arc::clone(&store), &clock);
        let limit = Limit::new(Frequency::Hour, 1);

        for _ in 0..3 {
            limiter.check(&limit, "svc", "res1").await.unwrap();
            clock.advance(TimeDelta::seconds(1));
        }

        assert_eq!(store.count("svc-res1", clock.now()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_zero_quantity_blocks_everything() {
        let limiter = SlidingWindowLimiter::new(Arc::new(InMemoryWindowStore::new()));
        let limit = Limit::new(Frequency::Day, 0);

        assert_eq!(limiter.check(&limit, "svc", "res1").await.unwrap(), Decision::Denied);
    }

    #[tokio::test]
    async fn test_zero_unit_disables_limiting() {
        let clock = MockClock::new(Utc::now());
        let limiter = limiter_at(Arc::new(InMemoryWindowStore::new()), &clock);
        let limit = Limit::new(Duration::ZERO, 1);

        for _ in 0..5 {
            assert_eq!(limiter.check(&limit, "svc", "res1").await.unwrap(), Decision::Admitted);
            clock.advance(TimeDelta::nanoseconds(1));
        }
    }

    #[tokio::test]
    async fn test_different_pairs_have_separate_windows() {
        let limiter = SlidingWindowLimiter::new(Arc::new(InMemoryWindowStore::new()));
        let limit = Limit::new(Frequency::Minute, 1);

        assert!(limiter.check(&limit, "svc", "res1").await.unwrap().is_admitted());
        assert!(limiter.check(&limit, "svc", "res2").await.unwrap().is_admitted());
        assert!(limiter.check(&limit, "other", "res1").await.unwrap().is_admitted());
        assert!(!limiter.check(&limit, "svc", "res1").await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_reset_forgets_hits() {
        let limiter = SlidingWindowLimiter::new(Arc::new(InMemoryWindowStore::new()));
        let limit = Limit::new(Frequency::Minute, 1);

        limiter.check(&limit, "svc", "res1").await.unwrap();
        limiter.reset().await.unwrap();
        assert!(limiter.check(&limit, "svc", "res1").await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_detached_recording_eventually_visible() {
        let clock = MockClock::new(Utc::now());
        let store: Arc<dyn WindowStore> = Arc::new(InMemoryWindowStore::new());
        let limiter = limiter_at(Arc::clone(&store), &clock).with_recording(HitRecording::Detached);
        let limit = Limit::new(Frequency::Minute, 1);

        assert!(limiter.check(&limit, "svc", "res1").await.unwrap().is_admitted());

        let mut recorded = 0;
        for _ in 0..100 {
            recorded = store.count("svc-res1", clock.now()).await.unwrap();
            if recorded == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(recorded, 1);
        assert!(!limiter.check(&limit, "svc", "res1").await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_concurrent_checks_do_not_lose_hits() {
        let store: Arc<dyn WindowStore> = Arc::new(InMemoryWindowStore::safe());
        let limiter = Arc::new(SlidingWindowLimiter::new(Arc::clone(&store)));
        let limit = Limit::new(Frequency::Hour, 1000);

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check(&limit, "svc", "res1").await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().unwrap().is_admitted());
        }

        // Hits landing on the same instant are still recorded individually.
        let later = Utc::now() + TimeDelta::seconds(1);
        assert_eq!(store.count("svc-res1", later).await.unwrap(), 50);
    }

    /// Store whose operations fail on demand.
    #[derive(Debug, Default)]
    struct ScriptedStore {
        inner: InMemoryWindowStore,
        fail_purge: Option<fn() -> StoreError>,
        fail_count: Option<fn() -> StoreError>,
        fail_add: bool,
        adds: Mutex<usize>,
    }

    fn backend_error() -> StoreError {
        StoreError::Backend(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection refused",
        )))
    }

    fn not_found() -> StoreError {
        StoreError::NotFound
    }

    #[async_trait]
    impl WindowStore for ScriptedStore {
        async fn add(&self, key: &str, at: DateTime<Utc>, expire_in: Duration) -> StoreResult<()> {
            *self.adds.lock() += 1;
            if self.fail_add {
                return Err(backend_error());
            }
            self.inner.add(key, at, expire_in).await
        }

        async fn purge(&self, key: &str, until: DateTime<Utc>) -> StoreResult<usize> {
            match self.fail_purge {
                Some(err) => Err(err()),
                None => self.inner.purge(key, until).await,
            }
        }

        async fn count(&self, key: &str, until: DateTime<Utc>) -> StoreResult<usize> {
            match self.fail_count {
                Some(err) => Err(err()),
                None => self.inner.count(key, until).await,
            }
        }

        async fn flush(&self) -> StoreResult<()> {
            self.inner.flush().await
        }
    }

    #[tokio::test]
    async fn test_purge_failure_is_not_fatal() {
        let store = Arc::new(ScriptedStore {
            fail_purge: Some(backend_error),
            ..Default::default()
        });
        let limiter = SlidingWindowLimiter::new(store.clone());
        let limit = Limit::new(Frequency::Minute, 1);

        assert!(limiter.check(&limit, "svc", "res1").await.unwrap().is_admitted());
        assert_eq!(*store.adds.lock(), 1);
    }

    #[tokio::test]
    async fn test_count_failure_denies_with_error() {
        let store = Arc::new(ScriptedStore {
            fail_count: Some(backend_error),
            ..Default::default()
        });
        let limiter = SlidingWindowLimiter::new(store.clone());
        let limit = Limit::new(Frequency::Minute, 10);

        let result = limiter.check(&limit, "svc", "res1").await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        // Nothing is recorded for a check that failed.
        assert_eq!(*store.adds.lock(), 0);
    }

    #[tokio::test]
    async fn test_not_found_is_an_empty_window() {
        let store = Arc::new(ScriptedStore {
            fail_purge: Some(not_found),
            fail_count: Some(not_found),
            ..Default::default()
        });
        let limiter = SlidingWindowLimiter::new(store);
        let limit = Limit::new(Frequency::Minute, 1);

        assert!(limiter.check(&limit, "svc", "res1").await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_add_failure_does_not_change_decision() {
        let store = Arc::new(ScriptedStore {
            fail_add: true,
            ..Default::default()
        });
        let limiter = SlidingWindowLimiter::new(store.clone());
        let limit = Limit::new(Frequency::Minute, 1);

        assert!(limiter.check(&limit, "svc", "res1").await.unwrap().is_admitted());
        assert!(limiter.check(&limit, "svc", "res1").await.unwrap().is_admitted());
        assert_eq!(*store.adds.lock(), 2);
    }

    #[tokio::test]
    async fn test_detached_add_failure_is_only_logged() {
        let store = Arc::new(ScriptedStore {
            fail_add: true,
            ..Default::default()
        });
        let limiter = SlidingWindowLimiter::new(store.clone()).with_recording(HitRecording::Detached);
        let limit = Limit::new(Frequency::Minute, 1);

        assert_eq!(limiter.check(&limit, "svc", "res1").await.unwrap(), Decision::Admitted);

        for _ in 0..100 {
            if *store.adds.lock() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*store.adds.lock(), 1);

        // The failed background add left nothing behind.
        assert_eq!(store.inner.count("svc-res1", Utc::now()).await.unwrap(), 0);
    }

    #[test]
    fn test_window_start_saturates() {
        let now = Utc::now();
        let limit = Limit::new(Duration::MAX, 1);
        assert_eq!(window_start(now, &limit), DateTime::<Utc>::MIN_UTC);

        let limit = Limit::new(Frequency::Minute, 1);
        assert_eq!(window_start(now, &limit), now - TimeDelta::minutes(1));
    }
}
