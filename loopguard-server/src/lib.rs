//! # loopguard server
//!
//! A standalone admission control service built on loopguard policies.
//!
//! ## Purpose
//!
//! Services that cannot embed the tower middleware (other languages, reverse
//! proxies doing sub-request authorization) can ask this server instead. Each
//! configured policy is exposed as `/check/<name>`; the server identifies the
//! caller, makes one atomic admission decision and answers 204 or the policy's
//! denial status.
//!
//! ## Quick Start
//!
//! ```bash
//! # Show all available options
//! loopguard --help
//!
//! # One policy named "default": 100 requests per minute per client IP
//! loopguard --port 8080
//!
//! # Several policies from a file
//! loopguard --policies policies.toml
//! ```
//!
//! ## Configuration
//!
//! Configure via CLI arguments or environment variables (CLI takes precedence):
//!
//! ```bash
//! export LOOPGUARD_PORT=9090
//! export LOOPGUARD_LIMIT=5
//! export LOOPGUARD_WINDOW_SECS=60
//! loopguard
//!
//! # List all available environment variables
//! loopguard --list-env-vars
//! ```
//!
//! ## Usage
//!
//! ```bash
//! curl -i http://localhost:8080/check/default
//! # HTTP/1.1 204 No Content
//! # rate-limit-limit: 100
//! # rate-limit-remaining: 99
//! # rate-limit-reset: 1700000060
//! ```
//!
//! When the server sits behind a proxy, the first valid address in
//! `X-Forwarded-For` identifies the caller.

pub mod config;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod transport;
