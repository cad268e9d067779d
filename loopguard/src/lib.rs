//! # loopguard
//!
//! Per-caller request admission control for axum and tower services.
//!
//! ## Overview
//!
//! loopguard decides, for every incoming request, whether the caller is still
//! within its quota of `limit` requests per `window`. It uses fixed-window
//! counters:
//! - **Simple**: one count and one window start per caller
//! - **Atomic**: the check and the increment happen in a single critical section
//! - **Cheap**: O(1) space per caller, expired counters are swept periodically
//!
//! Windows are anchored to the first request after the previous window ran
//! out. A caller can therefore fit up to `2 * limit - 1` requests into a
//! rolling window that straddles a reset. This is the accepted trade-off of
//! fixed-window counting.
//!
//! ## Quick Start
//!
//! ```
//! use axum::{Router, routing::post};
//! use loopguard::{Options, Policy, Quota};
//!
//! // 5 login attempts per caller per minute
//! let login = Policy::new(Quota::per_minute(5).unwrap(), Options::new());
//!
//! let app: Router = Router::new()
//!     .route("/v2/login/email", post(|| async { "ok" }))
//!     .route_layer(login);
//! ```
//!
//! Serve the router with `into_make_service_with_connect_info::<SocketAddr>()`
//! so the default identification can fall back to the peer address.
//!
//! ## Using the controller directly
//!
//! ```
//! use loopguard::{Controller, MemoryStore, Quota};
//! use std::sync::Arc;
//! use std::time::SystemTime;
//!
//! let controller = Controller::new(Quota::per_second(10).unwrap(), Arc::new(MemoryStore::new()));
//!
//! let decision = controller.try_consume("user:123", SystemTime::now()).unwrap();
//! if decision.allowed {
//!     println!("Admitted, {} left", decision.remaining);
//! }
//! ```
//!
//! ## Sharing a store
//!
//! Every policy gets its own controller, but policies can share one store.
//! Keys are built from the policy's prefix, a discriminator encoding its
//! (limit, window) pair and the caller identity, so different quotas never
//! collide:
//!
//! ```
//! use loopguard::{MemoryStore, Options, Policy, Quota};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let strict = Policy::new(Quota::per_minute(5).unwrap(), Options::new().store(store.clone()));
//! let loose = Policy::new(Quota::per_minute(300).unwrap(), Options::new().store(store));
//! ```
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash for faster hashing

pub mod core;
pub mod policy;

pub use core::{
    Clock, Controller, Counter, Decision, ManualClock, MemoryStore, MemoryStoreBuilder, Quota,
    Store, SystemClock, ThrottleError, Ttl,
};
pub use policy::{
    FORWARDED_FOR, IdentifyFn, Options, Policy, PolicyService, RATE_LIMIT_LIMIT,
    RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, identify_by_header, identify_by_ip, store_key,
};
