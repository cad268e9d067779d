//! Fixed-window access counters
//!
//! A [`Counter`] records how many accesses one identity made since the start
//! of its current window. Windows are anchored to the first access after the
//! previous window expired, not to wall-clock aligned buckets. A caller can
//! therefore get up to `2 * limit - 1` requests through inside a rolling
//! window that straddles a reset. That burst is part of the fixed-window
//! contract and is kept as is.

use std::time::{Duration, SystemTime};

/// Accesses recorded for one identity since `window_start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    count: u64,
    window_start: SystemTime,
    window: Duration,
}

impl Counter {
    /// Create an empty counter whose window starts at `now`
    pub fn new(now: SystemTime, window: Duration) -> Self {
        Counter {
            count: 0,
            window_start: now,
            window,
        }
    }

    /// Raw recorded count, regardless of freshness
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn window_start(&self) -> SystemTime {
        self.window_start
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// When the current window ends
    pub fn reset_at(&self) -> SystemTime {
        self.window_start + self.window
    }

    /// Whether `now` still falls inside the current window
    ///
    /// A `now` earlier than the window start (clock stepped backwards) counts
    /// as fresh.
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        match now.duration_since(self.window_start) {
            Ok(elapsed) => elapsed < self.window,
            Err(_) => true,
        }
    }

    /// Count that applies at `now`: the recorded count while fresh, zero once stale
    pub fn effective_count(&self, now: SystemTime) -> u64 {
        if self.is_fresh(now) { self.count } else { 0 }
    }

    /// Record one access, starting a new window at `now` if the current one has elapsed
    pub fn record_access(&mut self, now: SystemTime) {
        if self.is_fresh(now) {
            self.count = self.count.saturating_add(1);
        } else {
            self.count = 1;
            self.window_start = now;
        }
    }
}
