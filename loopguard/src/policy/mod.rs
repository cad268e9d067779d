//! Throttling policies for axum/tower services
//!
//! A [`Policy`] is built once per route registration from a [`Quota`] and
//! [`Options`]. It owns one [`Controller`] for the lifetime of the process and
//! is applied as a tower layer:
//!
//! ```
//! use axum::{Router, routing::get};
//! use loopguard::{Options, Policy, Quota};
//!
//! let policy = Policy::new(Quota::per_minute(5).unwrap(), Options::new());
//!
//! let app: Router = Router::new()
//!     .route("/v2/login/email", get(|| async { "ok" }))
//!     .layer(policy);
//! ```
//!
//! For every request the policy resolves the caller identity, makes one
//! atomic admission decision and reports it in the `rate-limit-limit`,
//! `rate-limit-remaining` and `rate-limit-reset` response headers. Denied
//! requests get the configured status and message and never reach the inner
//! service. If the identity cannot be resolved or the store fails, the request
//! is answered with 500 rather than admitted unchecked.

mod identity;
mod layer;
mod options;

pub use identity::{FORWARDED_FOR, IdentifyFn, identify_by_header, identify_by_ip};
pub use layer::{PolicyService, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET};
pub use options::{DEFAULT_KEY_PREFIX, DEFAULT_MESSAGE, DEFAULT_STATUS_CODE, Options};

use crate::core::{Clock, Controller, Decision, Quota, ThrottleError};
use axum::extract::Request;
use axum::http::StatusCode;
use std::sync::Arc;

/// Build the store key for one caller under one quota
///
/// ```
/// use loopguard::{Quota, store_key};
///
/// let quota = Quota::per_second(2).unwrap();
/// assert_eq!(store_key("throttle", &quota, "1.2.3.4"), "throttle_2r1000000000ns_1.2.3.4");
/// ```
pub fn store_key(prefix: &str, quota: &Quota, identity: &str) -> String {
    format!("{prefix}_{}_{identity}", quota.discriminator())
}

/// A registered throttling policy
///
/// Cloning is cheap; clones share the same controller and counters.
#[derive(Clone)]
pub struct Policy {
    quota: Quota,
    // None when the policy was built disabled
    enforcer: Option<Arc<Enforcer>>,
}

pub(crate) struct Enforcer {
    pub controller: Controller,
    pub status_code: StatusCode,
    pub message: String,
    pub identify: IdentifyFn,
    pub key_prefix: String,
    pub clock: Arc<dyn Clock>,
}

impl Policy {
    /// Build a policy for `quota`, resolving `options` against the defaults
    ///
    /// A disabled policy is decided here, once: its layer forwards every
    /// request untouched and never creates a controller.
    pub fn new(quota: Quota, options: Options) -> Self {
        let settings = options.resolve();

        if settings.disabled {
            tracing::info!(quota = %quota, "Throttle policy disabled");
            return Policy {
                quota,
                enforcer: None,
            };
        }

        tracing::debug!(
            quota = %quota,
            prefix = %settings.key_prefix,
            status = %settings.status_code,
            "Throttle policy registered"
        );

        Policy {
            quota,
            enforcer: Some(Arc::new(Enforcer {
                controller: Controller::new(quota, settings.store),
                status_code: settings.status_code,
                message: settings.message,
                identify: settings.identify,
                key_prefix: settings.key_prefix,
                clock: settings.clock,
            })),
        }
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    pub fn is_disabled(&self) -> bool {
        self.enforcer.is_none()
    }

    /// Admission decision for an already resolved identity
    ///
    /// Records the access when admitted. Returns `Ok(None)` for a disabled
    /// policy.
    pub fn check(&self, identity: &str) -> Result<Option<Decision>, ThrottleError> {
        match &self.enforcer {
            Some(enforcer) => enforcer.decide(identity).map(Some),
            None => Ok(None),
        }
    }
}

impl Enforcer {
    fn decide(&self, identity: &str) -> Result<Decision, ThrottleError> {
        if identity.is_empty() {
            return Err(ThrottleError::Identity("empty identity".to_string()));
        }
        let key = store_key(&self.key_prefix, &self.controller.quota(), identity);
        self.controller.try_consume(&key, self.clock.now())
    }

    pub(crate) fn admit(&self, request: &Request) -> Result<Decision, ThrottleError> {
        let identity = (self.identify)(request)?;
        self.decide(&identity)
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("quota", &self.quota)
            .field("disabled", &self.is_disabled())
            .finish()
    }
}
