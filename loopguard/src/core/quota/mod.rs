//! Admission quotas
//!
//! This module provides the [`Quota`] type, the immutable policy value that
//! pairs a request limit with the time window it applies to.

use super::ThrottleError;
use std::fmt;
use std::time::Duration;


/// A request limit within a fixed time window
///
/// Quotas are validated on construction: the limit must be at least one and
/// the window must be non-zero. Once built a quota never changes.
///
/// # Examples
///
/// ```
/// use loopguard::Quota;
/// use std::time::Duration;
///
/// // 5 requests per minute
/// let quota = Quota::per_minute(5).unwrap();
/// assert_eq!(quota.limit(), 5);
/// assert_eq!(quota.window(), Duration::from_secs(60));
///
/// // Custom window: 3 requests every 10 seconds
/// let quota = Quota::new(3, Duration::from_secs(10)).unwrap();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quota {
    limit: u64,
    window: Duration,
}

impl Quota {
    /// Longest accepted window, 100 years
    ///
    /// Window ends are computed as `window_start + window`, which must stay
    /// representable as a `SystemTime`.
    pub const MAX_WINDOW: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

    /// Creates a quota of `limit` requests per `window`
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::InvalidQuota`] if `limit` is zero, or `window`
    /// is zero or longer than [`Quota::MAX_WINDOW`].
    pub fn new(limit: u64, window: Duration) -> Result<Self, ThrottleError> {
        if limit == 0 || window.is_zero() || window > Self::MAX_WINDOW {
            return Err(ThrottleError::InvalidQuota { limit, window });
        }
        Ok(Quota { limit, window })
    }

    /// Creates a quota of n requests per second
    pub fn per_second(n: u64) -> Result<Self, ThrottleError> {
        Self::new(n, Duration::from_secs(1))
    }

    /// Creates a quota of n requests per minute
    pub fn per_minute(n: u64) -> Result<Self, ThrottleError> {
        Self::new(n, Duration::from_secs(60))
    }

    /// Creates a quota of n requests per hour
    pub fn per_hour(n: u64) -> Result<Self, ThrottleError> {
        Self::new(n, Duration::from_secs(3600))
    }

    /// Creates a quota of n requests per day
    pub fn per_day(n: u64) -> Result<Self, ThrottleError> {
        Self::new(n, Duration::from_secs(86400))
    }

    /// Maximum number of requests admitted per window
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of a window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Stable string distinguishing this quota from any other (limit, window) pair
    ///
    /// Both values are encoded verbatim, so two quotas share a discriminator
    /// only when they are equal.
    ///
    /// ```
    /// use loopguard::Quota;
    /// use std::time::Duration;
    ///
    /// let a = Quota::new(1, Duration::from_secs(1)).unwrap();
    /// let b = Quota::new(60, Duration::from_secs(60)).unwrap();
    /// assert_ne!(a.discriminator(), b.discriminator());
    /// ```
    pub fn discriminator(&self) -> String {
        format!("{}r{}ns", self.limit, self.window.as_nanos())
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per {:?}", self.limit, self.window)
    }
}
