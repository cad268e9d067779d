use anyhow::Result;
use std::sync::Arc;

use loopguard_server::config::Config;
use loopguard_server::metrics::Metrics;
use loopguard_server::registry::Registry;
use loopguard_server::store;
use loopguard_server::transport::{Transport, http::HttpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("loopguard={}", config.log_level).parse()?)
                .add_directive(format!("loopguard_server={}", config.log_level).parse()?),
        )
        .init();

    let store = store::create_store(&config.store);
    let registry = Registry::build(&config.policies, store)?;
    let metrics = Arc::new(Metrics::new(registry.names()));

    tracing::info!(
        policies = config.policies.len(),
        store_capacity = config.store.capacity,
        "loopguard server starting"
    );

    let transport = HttpTransport::new(&config.http.host, config.http.port)?;
    transport.start(registry, metrics).await
}
