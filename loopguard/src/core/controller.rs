//! Fixed-window admission controller
//!
//! A [`Controller`] pairs one [`Quota`] with a shared [`Store`] and makes
//! admission decisions for store keys. Each decision reads the counter,
//! compares it against the quota and, when admitted, increments and writes it
//! back, all inside one critical section for that key. Separate check and
//! record calls would let concurrent requests for one identity all observe
//! spare capacity before any of them increments.

use super::{Counter, Quota, Store, ThrottleError, Ttl};
use parking_lot::Mutex;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::RandomState;
#[cfg(not(feature = "ahash"))]
use std::collections::hash_map::RandomState;

const DEFAULT_LOCK_SHARDS: usize = 64;

/// Outcome of a single admission decision
///
/// Computed per request, reported to the caller and then discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the access was admitted (and recorded)
    pub allowed: bool,
    /// The quota's request limit
    pub limit: u64,
    /// Accesses left in the current window after this decision
    pub remaining: u64,
    /// When the current window ends
    pub reset_at: SystemTime,
}

impl Decision {
    /// Time left until the window resets, zero once it has passed
    pub fn retry_after(&self, now: SystemTime) -> Duration {
        self.reset_at.duration_since(now).unwrap_or(Duration::ZERO)
    }
}

/// Admission controller for one quota
///
/// Keys are hashed onto a fixed set of lock shards, so decisions for the same
/// key are strictly serialized while unrelated keys mostly proceed in
/// parallel. Controllers never share locks with each other.
///
/// # Example
///
/// ```
/// use loopguard::{Controller, MemoryStore, Quota};
/// use std::sync::Arc;
/// use std::time::SystemTime;
///
/// let controller = Controller::new(Quota::per_minute(2).unwrap(), Arc::new(MemoryStore::new()));
/// let now = SystemTime::now();
///
/// assert!(controller.try_consume("1.2.3.4", now).unwrap().allowed);
/// assert!(controller.try_consume("1.2.3.4", now).unwrap().allowed);
/// let denied = controller.try_consume("1.2.3.4", now).unwrap();
/// assert!(!denied.allowed);
/// assert_eq!(denied.remaining, 0);
/// ```
pub struct Controller {
    quota: Quota,
    store: Arc<dyn Store>,
    locks: Box<[Mutex<()>]>,
    hasher: RandomState,
}

impl Controller {
    /// Create a controller for `quota` backed by `store`
    pub fn new(quota: Quota, store: Arc<dyn Store>) -> Self {
        Self::with_lock_shards(quota, store, DEFAULT_LOCK_SHARDS)
    }

    /// Create a controller with a specific number of lock shards
    ///
    /// A single shard serializes every key under this quota.
    pub fn with_lock_shards(quota: Quota, store: Arc<dyn Store>, shards: usize) -> Self {
        let shards = shards.max(1);
        Controller {
            quota,
            store,
            locks: (0..shards).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
        }
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    fn lock_for(&self, key: &str) -> &Mutex<()> {
        let index = (self.hasher.hash_one(key) as usize) % self.locks.len();
        &self.locks[index]
    }

    /// Read the counter for `key`, treating missing or stale entries as a
    /// fresh empty window starting at `now`. Never writes.
    fn load(&self, key: &str, now: SystemTime) -> Result<Counter, ThrottleError> {
        let stored = self.store.get(key, now).map_err(ThrottleError::Store)?;
        Ok(match stored {
            Some(counter) if counter.is_fresh(now) => counter,
            _ => Counter::new(now, self.quota.window()),
        })
    }

    fn save(&self, key: &str, counter: Counter, now: SystemTime) -> Result<(), ThrottleError> {
        // The entry is useless once its window has elapsed
        let ttl = Ttl::After(counter.reset_at().duration_since(now).unwrap_or(Duration::ZERO));
        self.store
            .set(key, counter, ttl, now)
            .map_err(ThrottleError::Store)
    }

    /// Effective number of accesses recorded for `key` in the current window
    pub fn current_count(&self, key: &str, now: SystemTime) -> Result<u64, ThrottleError> {
        Ok(self.load(key, now)?.effective_count(now))
    }

    /// Whether `key` has used up its quota for the current window
    pub fn is_over_quota(&self, key: &str, now: SystemTime) -> Result<bool, ThrottleError> {
        Ok(self.current_count(key, now)? >= self.quota.limit())
    }

    /// Accesses left for `key` in the current window, never negative
    pub fn remaining_capacity(&self, key: &str, now: SystemTime) -> Result<u64, ThrottleError> {
        Ok(self.quota.limit().saturating_sub(self.current_count(key, now)?))
    }

    /// When the current window for `key` ends
    pub fn reset_at(&self, key: &str, now: SystemTime) -> Result<SystemTime, ThrottleError> {
        Ok(self.load(key, now)?.reset_at())
    }

    /// Record one access for `key` without checking the quota
    pub fn record_access(&self, key: &str, now: SystemTime) -> Result<(), ThrottleError> {
        let _guard = self.lock_for(key).lock();
        let mut counter = self.load(key, now)?;
        counter.record_access(now);
        self.save(key, counter, now)
    }

    /// Admit and record one access for `key` if the quota allows it
    ///
    /// The read, the decision and the write happen under the key's lock, so
    /// no more than `limit` accesses are admitted per window regardless of
    /// concurrency. Denied accesses are not recorded.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::Store`] if the store fails. Callers should
    /// treat that as "capacity unknown" and not admit the request.
    pub fn try_consume(&self, key: &str, now: SystemTime) -> Result<Decision, ThrottleError> {
        let limit = self.quota.limit();
        let _guard = self.lock_for(key).lock();

        let mut counter = self.load(key, now)?;
        let used = counter.effective_count(now);

        if used >= limit {
            tracing::trace!(key, used, limit, "Access denied");
            return Ok(Decision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at: counter.reset_at(),
            });
        }

        counter.record_access(now);
        self.save(key, counter, now)?;

        tracing::trace!(key, used = counter.count(), limit, "Access admitted");
        Ok(Decision {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(counter.count()),
            reset_at: counter.reset_at(),
        })
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("quota", &self.quota)
            .field("lock_shards", &self.locks.len())
            .finish()
    }
}
