//! Core components of the loopguard admission controller
//!
//! This module contains the fundamental building blocks:
//! - [`quota`]: The immutable (limit, window) policy value
//! - [`counter`]: Per-identity fixed-window access counts
//! - [`store`]: Storage backends for counters
//! - [`clock`]: Time sources
//! - [`controller`]: Atomic check-and-increment over a store

pub mod clock;
pub mod controller;
pub mod counter;
pub mod quota;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{Controller, Decision};
pub use counter::Counter;
pub use quota::Quota;
pub use store::{MemoryStore, MemoryStoreBuilder, Store, Ttl};

use std::time::Duration;

/// Errors that can occur while making admission decisions
///
/// # Variants
///
/// - [`InvalidQuota`](ThrottleError::InvalidQuota): A quota was built with a zero limit, or a zero or oversized window
/// - [`Identity`](ThrottleError::Identity): The caller identity could not be resolved
/// - [`Store`](ThrottleError::Store): The counter store failed to read or write
///
/// # Example
///
/// ```
/// use loopguard::{Quota, ThrottleError};
/// use std::time::Duration;
///
/// match Quota::new(0, Duration::from_secs(60)) {
///     Err(ThrottleError::InvalidQuota { limit, .. }) => assert_eq!(limit, 0),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ThrottleError {
    #[error("invalid quota: limit {limit} within {window:?}")]
    InvalidQuota { limit: u64, window: Duration },

    #[error("unable to identify caller: {0}")]
    Identity(String),

    #[error("store error: {0}")]
    Store(String),
}
