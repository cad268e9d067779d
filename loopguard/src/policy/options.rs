//! Policy options and their resolution against defaults
//!
//! Every field is optional. Anything set explicitly wins, including values
//! like an empty message; anything left unset falls back to the documented
//! default when the policy is built.

use super::identity::{IdentifyFn, identify_by_ip};
use crate::core::{Clock, MemoryStore, Store, SystemClock, ThrottleError};
use axum::extract::Request;
use axum::http::StatusCode;
use std::sync::Arc;

/// Status code returned to throttled callers
pub const DEFAULT_STATUS_CODE: StatusCode = StatusCode::TOO_MANY_REQUESTS;
/// Body returned to throttled callers
pub const DEFAULT_MESSAGE: &str = "Too Many Requests";
/// First segment of every store key
pub const DEFAULT_KEY_PREFIX: &str = "throttle";

/// Optional settings for a [`Policy`](super::Policy)
///
/// | Setting | Default |
/// |---|---|
/// | status code | 429 Too Many Requests |
/// | message | `"Too Many Requests"` |
/// | identification | [`identify_by_ip`] |
/// | key prefix | `"throttle"` |
/// | store | a new [`MemoryStore`] (24h default TTL, 5 day sweep) |
/// | disabled | `false` |
/// | clock | [`SystemClock`] |
///
/// # Example
///
/// ```
/// use loopguard::Options;
/// use axum::http::StatusCode;
///
/// let options = Options::new()
///     .status_code(StatusCode::SERVICE_UNAVAILABLE)
///     .message("Slow down")
///     .key_prefix("login");
/// ```
#[derive(Clone, Default)]
pub struct Options {
    status_code: Option<StatusCode>,
    message: Option<String>,
    identify: Option<IdentifyFn>,
    key_prefix: Option<String>,
    store: Option<Arc<dyn Store>>,
    disabled: Option<bool>,
    clock: Option<Arc<dyn Clock>>,
}

/// Options with every default applied
pub(crate) struct Settings {
    pub status_code: StatusCode,
    pub message: String,
    pub identify: IdentifyFn,
    pub key_prefix: String,
    pub store: Arc<dyn Store>,
    pub disabled: bool,
    pub clock: Arc<dyn Clock>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status code for throttled responses
    pub fn status_code(mut self, status: StatusCode) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Body of throttled responses
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Function deriving the caller identity from a request
    ///
    /// Returning an error, or an empty identity, fails the request with an
    /// internal error instead of pooling unrelated callers under one counter.
    pub fn identify_with<F>(mut self, identify: F) -> Self
    where
        F: Fn(&Request) -> Result<String, ThrottleError> + Send + Sync + 'static,
    {
        self.identify = Some(Arc::new(identify));
        self
    }

    /// First segment of the store keys this policy writes
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Counter store, usually shared between policies
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Turn the policy into a pass-through that never touches the store
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }

    /// Time source for admission decisions
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub(crate) fn resolve(self) -> Settings {
        Settings {
            status_code: self.status_code.unwrap_or(DEFAULT_STATUS_CODE),
            message: self.message.unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
            identify: self.identify.unwrap_or_else(|| Arc::new(identify_by_ip)),
            key_prefix: self
                .key_prefix
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            disabled: self.disabled.unwrap_or(false),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("status_code", &self.status_code)
            .field("message", &self.message)
            .field("identify", &self.identify.as_ref().map(|_| "custom"))
            .field("key_prefix", &self.key_prefix)
            .field("store", &self.store.as_ref().map(|_| "custom"))
            .field("disabled", &self.disabled)
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Counter, ManualClock, Ttl};
    use axum::body::Body;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_defaults() {
        let settings = Options::new().resolve();
        assert_eq!(settings.status_code, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(settings.message, "Too Many Requests");
        assert_eq!(settings.key_prefix, "throttle");
        assert!(!settings.disabled);
    }

    #[test]
    fn test_explicit_values_override() {
        let settings = Options::new()
            .status_code(StatusCode::SERVICE_UNAVAILABLE)
            .message("Slow down")
            .key_prefix("login")
            .disabled(true)
            .resolve();

        assert_eq!(settings.status_code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(settings.message, "Slow down");
        assert_eq!(settings.key_prefix, "login");
        assert!(settings.disabled);
    }

    #[test]
    fn test_empty_values_are_real_overrides() {
        let settings = Options::new().message("").key_prefix("").resolve();
        assert_eq!(settings.message, "");
        assert_eq!(settings.key_prefix, "");
    }

    #[test]
    fn test_disabled_false_is_kept() {
        let settings = Options::new().disabled(true).disabled(false).resolve();
        assert!(!settings.disabled);
    }

    #[test]
    fn test_custom_store_and_clock_are_used() {
        let store = Arc::new(MemoryStore::new());
        let start = UNIX_EPOCH + std::time::Duration::from_secs(42);
        let settings = Options::new()
            .store(store.clone())
            .clock(Arc::new(ManualClock::new(start)))
            .resolve();

        let now: SystemTime = settings.clock.now();
        assert_eq!(now, start);

        settings
            .store
            .set(
                "k",
                Counter::new(now, std::time::Duration::from_secs(1)),
                Ttl::Default,
                now,
            )
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_custom_identification() {
        let settings = Options::new()
            .identify_with(|_req| Ok("fixed".to_string()))
            .resolve();
        let request = Request::new(Body::empty());
        assert_eq!((settings.identify)(&request).unwrap(), "fixed");
    }
}
