//! Store factory
//!
//! The server keeps one in-memory counter store and shares it between all
//! configured policies. Keys carry each policy's prefix and quota
//! discriminator, so policies never read each other's counters.

use crate::config::StoreConfig;
use loopguard::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

/// Create the shared counter store from configuration
pub fn create_store(config: &StoreConfig) -> Arc<MemoryStore> {
    let store = MemoryStore::builder()
        .capacity(config.capacity)
        .default_ttl(Duration::from_secs(config.default_ttl))
        .cleanup_interval(Duration::from_secs(config.cleanup_interval))
        .build();

    tracing::debug!(
        capacity = config.capacity,
        default_ttl = ?store.default_ttl(),
        cleanup_interval = ?store.cleanup_interval(),
        "Created counter store"
    );

    Arc::new(store)
}
