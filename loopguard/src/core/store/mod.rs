use super::Counter;
use std::time::{Duration, SystemTime};


mod memory;

pub use memory::{MemoryStore, MemoryStoreBuilder};

/// How long a stored counter may live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the store's own default expiry
    #[default]
    Default,
    /// Expire this long after the write
    After(Duration),
    /// Never expire
    Never,
}

/// Store trait for counter state shared by every controller in the process
///
/// Implementations own their locking and expiry: `get` must treat expired
/// entries as absent, `set` inserts or overwrites. Errors are reported as
/// plain strings and surface to callers as [`ThrottleError::Store`].
///
/// Stores backed by a network service should not be driven by a controller
/// holding a process-local lock across the round trip; those want their own
/// atomic increment primitive instead.
///
/// [`ThrottleError::Store`]: crate::ThrottleError::Store
pub trait Store: Send + Sync {
    /// Get the counter stored under `key`, if present and unexpired
    fn get(&self, key: &str, now: SystemTime) -> Result<Option<Counter>, String>;

    /// Insert or overwrite the counter under `key`
    fn set(&self, key: &str, value: Counter, ttl: Ttl, now: SystemTime) -> Result<(), String>;
}
