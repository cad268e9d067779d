//! Transport layer for the admission control server
//!
//! A transport exposes the configured policies to clients over the network.
//! All transports implement the [`Transport`] trait and share the policies'
//! counter store.
//!
//! # Available Transports
//!
//! - [`http`]: plain HTTP, one `/check/<policy>` route per policy

pub mod http;

use crate::metrics::Metrics;
use crate::registry::Registry;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for all transport implementations
///
/// Each transport is responsible for:
/// - Accepting client connections
/// - Running each request through the policy it targets
/// - Recording the outcome in the shared metrics
#[async_trait]
pub trait Transport {
    /// Start the transport server
    ///
    /// Runs until the process is asked to shut down or an error occurs.
    async fn start(self, registry: Registry, metrics: Arc<Metrics>) -> Result<()>;
}
