//! Simple metrics collection for observability
//!
//! Lightweight per-policy counters built on atomics. The set of policies is
//! fixed at startup, so recording never allocates or locks.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Outcome of one admission check, as observed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allowed,
    Denied,
    Error,
}

/// Decision counters of a single policy
#[derive(Debug, Default)]
pub struct PolicyMetrics {
    pub allowed: AtomicU64,
    pub denied: AtomicU64,
    pub errors: AtomicU64,
}

impl PolicyMetrics {
    fn counter(&self, outcome: Outcome) -> &AtomicU64 {
        match outcome {
            Outcome::Allowed => &self.allowed,
            Outcome::Denied => &self.denied,
            Outcome::Error => &self.errors,
        }
    }

    fn record(&self, outcome: Outcome) {
        self.counter(outcome).fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, outcome: Outcome) -> u64 {
        self.counter(outcome).load(Ordering::Relaxed)
    }
}

/// Core metrics collected by the server
#[derive(Debug)]
pub struct Metrics {
    start_time: Instant,
    // Ordered as configured, for stable export
    names: Vec<String>,
    policies: HashMap<String, PolicyMetrics>,
    /// Keys currently held by the counter store
    pub active_keys: AtomicUsize,
}

impl Metrics {
    pub fn new<'a>(policy_names: impl IntoIterator<Item = &'a str>) -> Self {
        let names: Vec<String> = policy_names.into_iter().map(str::to_string).collect();
        let policies = names
            .iter()
            .map(|name| (name.clone(), PolicyMetrics::default()))
            .collect();

        Self {
            start_time: Instant::now(),
            names,
            policies,
            active_keys: AtomicUsize::new(0),
        }
    }

    /// Record the outcome of one check against `policy`
    ///
    /// Unknown policy names are ignored.
    pub fn record(&self, policy: &str, outcome: Outcome) {
        if let Some(metrics) = self.policies.get(policy) {
            metrics.record(outcome);
        }
    }

    pub fn policy(&self, name: &str) -> Option<&PolicyMetrics> {
        self.policies.get(name)
    }

    pub fn update_active_keys(&self, count: usize) {
        self.active_keys.store(count, Ordering::Relaxed);
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn totals(&self) -> (u64, u64, u64) {
        self.policies
            .values()
            .fold((0, 0, 0), |(allowed, denied, errors), metrics| {
                (
                    allowed + metrics.get(Outcome::Allowed),
                    denied + metrics.get(Outcome::Denied),
                    errors + metrics.get(Outcome::Error),
                )
            })
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(512 + self.names.len() * 256);

        // Writing to a String cannot fail
        let _ = self.write_prometheus(&mut output);
        output
    }

    fn write_prometheus(&self, out: &mut String) -> std::fmt::Result {
        writeln!(
            out,
            "# HELP loopguard_uptime_seconds Time since server start in seconds"
        )?;
        writeln!(out, "# TYPE loopguard_uptime_seconds gauge")?;
        writeln!(out, "loopguard_uptime_seconds {}\n", self.uptime_seconds())?;

        let (allowed, denied, errors) = self.totals();
        writeln!(
            out,
            "# HELP loopguard_requests_total Total number of admission checks"
        )?;
        writeln!(out, "# TYPE loopguard_requests_total counter")?;
        writeln!(out, "loopguard_requests_total {}\n", allowed + denied + errors)?;

        for (metric, help, outcome) in [
            (
                "loopguard_requests_allowed",
                "Requests admitted by policy",
                Outcome::Allowed,
            ),
            (
                "loopguard_requests_denied",
                "Requests denied by policy",
                Outcome::Denied,
            ),
            (
                "loopguard_requests_errors",
                "Checks that failed with an internal error by policy",
                Outcome::Error,
            ),
        ] {
            writeln!(out, "# HELP {metric} {help}")?;
            writeln!(out, "# TYPE {metric} counter")?;
            for name in &self.names {
                if let Some(metrics) = self.policies.get(name) {
                    writeln!(out, "{metric}{{policy=\"{name}\"}} {}", metrics.get(outcome))?;
                }
            }
            writeln!(out)?;
        }

        writeln!(
            out,
            "# HELP loopguard_active_keys Number of counters held by the store"
        )?;
        writeln!(out, "# TYPE loopguard_active_keys gauge")?;
        writeln!(
            out,
            "loopguard_active_keys {}",
            self.active_keys.load(Ordering::Relaxed)
        )?;

        Ok(())
    }
}
