use super::{Store, Ttl};
use crate::core::Counter;
use parking_lot::Mutex;
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

// Configuration constants
const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 5 * 24 * 60 * 60;

/// In-memory counter store with per-entry expiry and periodic cleanup
///
/// Expired entries are invisible to `get` immediately. They are physically
/// removed by a sweep that runs on the first write after each cleanup
/// interval has elapsed.
///
/// The store is internally synchronized and meant to be shared between
/// controllers through an `Arc`.
///
/// # Example
///
/// ```
/// use loopguard::MemoryStore;
/// use std::time::Duration;
///
/// // Entries live for an hour by default, expired ones are swept every 10 minutes
/// let store = MemoryStore::builder()
///     .default_ttl(Duration::from_secs(3600))
///     .cleanup_interval(Duration::from_secs(600))
///     .build();
/// assert!(store.is_empty());
/// ```
pub struct MemoryStore {
    state: Mutex<State>,
    default_ttl: Duration,
    cleanup_interval: Duration,
}

struct State {
    data: HashMap<String, (Counter, Option<SystemTime>)>,
    // Scheduled on the first write, so injected clocks see a consistent timeline
    next_cleanup: Option<SystemTime>,
    // Number of entries removed by the last sweep
    expired_count: usize,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.len())
            .field("default_ttl", &self.default_ttl)
            .field("cleanup_interval", &self.cleanup_interval)
            .finish()
    }
}

/// Builder for configuring a MemoryStore
///
/// ```
/// use loopguard::MemoryStore;
/// use std::time::Duration;
///
/// let store = MemoryStore::builder()
///     .capacity(100_000)
///     .cleanup_interval(Duration::from_secs(120))
///     .build();
/// ```
pub struct MemoryStoreBuilder {
    capacity: usize,
    default_ttl: Duration,
    cleanup_interval: Duration,
}

impl MemoryStore {
    /// Create a MemoryStore with a 24 hour default TTL and a 5 day cleanup interval
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a MemoryStore sized for `capacity` keys with default expiry settings
    pub fn with_capacity(capacity: usize) -> Self {
        Self::builder().capacity(capacity).build()
    }

    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    fn with_config(capacity: usize, default_ttl: Duration, cleanup_interval: Duration) -> Self {
        MemoryStore {
            state: Mutex::new(State {
                // Pre-allocate with overhead to avoid rehashing
                data: HashMap::with_capacity(
                    (capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize,
                ),
                next_cleanup: None,
                expired_count: 0,
            }),
            default_ttl,
            cleanup_interval,
        }
    }

    /// Number of entries held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().data.is_empty()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    #[cfg(test)]
    pub(crate) fn expired_count(&self) -> usize {
        self.state.lock().expired_count
    }

    fn expiry_for(&self, ttl: Ttl, now: SystemTime) -> Option<SystemTime> {
        // An expiry past the representable range never comes
        match ttl {
            Ttl::Default => now.checked_add(self.default_ttl),
            Ttl::After(duration) => now.checked_add(duration),
            Ttl::Never => None,
        }
    }
}

impl State {
    fn maybe_clean_expired(&mut self, now: SystemTime, interval: Duration) {
        let due = match self.next_cleanup {
            Some(at) => now >= at,
            None => {
                self.next_cleanup = now.checked_add(interval);
                false
            }
        };

        if due {
            let before_count = self.data.len();
            self.data.retain(|_, (_, expiry)| match expiry {
                Some(exp) => *exp > now,
                None => true,
            });
            self.expired_count = before_count.saturating_sub(self.data.len());
            self.next_cleanup = now.checked_add(interval);
            tracing::debug!(
                removed = self.expired_count,
                remaining = self.data.len(),
                "Swept expired counters"
            );
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str, now: SystemTime) -> Result<Option<Counter>, String> {
        let state = self.state.lock();
        match state.data.get(key) {
            Some((value, Some(expiry))) if *expiry > now => Ok(Some(*value)),
            Some((value, None)) => Ok(Some(*value)),
            _ => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Counter, ttl: Ttl, now: SystemTime) -> Result<(), String> {
        let expiry = self.expiry_for(ttl, now);
        let mut state = self.state.lock();
        // Only clean periodically, not on every operation
        state.maybe_clean_expired(now, self.cleanup_interval);
        state.data.insert(key.to_string(), (value, expiry));
        Ok(())
    }
}

impl Default for MemoryStoreBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl MemoryStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected capacity (number of unique keys)
    ///
    /// The store will allocate 30% more space to reduce hash collisions.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the expiry used for writes made with [`Ttl::Default`]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the interval between cleanup sweeps
    ///
    /// Shorter intervals mean more consistent memory usage but higher CPU overhead.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn build(self) -> MemoryStore {
        MemoryStore::with_config(self.capacity, self.default_ttl, self.cleanup_interval)
    }
}
