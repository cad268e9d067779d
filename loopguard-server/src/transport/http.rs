//! HTTP transport
//!
//! # API Endpoints
//!
//! ## ANY /check/{policy}
//!
//! Runs an admission check for the caller against the named policy. The caller
//! is identified as the policy is configured to (client IP by default, or a
//! request header).
//!
//! - `204 No Content` when admitted
//! - the policy's status and message (default `429 Too Many Requests`) when
//!   denied
//! - `500 Internal Server Error` when the caller cannot be identified or the
//!   store fails
//!
//! Admitted and denied responses carry `rate-limit-limit`,
//! `rate-limit-remaining` and `rate-limit-reset` headers.
//!
//! ## GET /policies
//!
//! JSON list of the configured policies.
//!
//! ## GET /metrics
//!
//! Prometheus text format metrics.
//!
//! ## GET /health
//!
//! Health check endpoint. Returns "OK" with 200 status.

use super::Transport;
use crate::metrics::{Metrics, Outcome};
use crate::registry::{PolicySummary, Registry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use loopguard::RATE_LIMIT_REMAINING;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

/// HTTP transport implementation
pub struct HttpTransport {
    addr: SocketAddr,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("Invalid listen address {host}:{port}"))?;
        Ok(Self { addr })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(self, registry: Registry, metrics: Arc<Metrics>) -> Result<()> {
        let app = router(registry, metrics);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.addr))?;
        tracing::info!("HTTP server listening on {}", self.addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    registry: Registry,
    metrics: Arc<Metrics>,
}

/// Metrics sink for the outcomes of one policy route
#[derive(Clone)]
struct Observed {
    policy: Arc<str>,
    metrics: Arc<Metrics>,
}

/// Build the HTTP router serving every policy in `registry`
///
/// The router must be served with connect info for IP-identified policies to
/// see the peer address.
pub fn router(registry: Registry, metrics: Arc<Metrics>) -> Router {
    let mut app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(handle_metrics))
        .route("/policies", get(handle_policies));

    for named in registry.policies() {
        let observed = Observed {
            policy: Arc::from(named.name.as_str()),
            metrics: metrics.clone(),
        };
        let check = any(handle_admitted)
            .layer(named.policy.clone())
            .layer(middleware::from_fn_with_state(observed, observe));
        app = app.route(&format!("/check/{}", named.name), check);
    }

    app.with_state(AppState { registry, metrics })
}

async fn handle_admitted() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state
        .metrics
        .update_active_keys(state.registry.store().len());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}

async fn handle_policies(State(state): State<AppState>) -> Json<Vec<PolicySummary>> {
    Json(state.registry.summaries())
}

async fn observe(State(observed): State<Observed>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    observed
        .metrics
        .record(&observed.policy, classify(&response));
    response
}

// Denials are the only failures that carry rate-limit headers
fn classify(response: &Response) -> Outcome {
    if response.status().is_success() {
        Outcome::Allowed
    } else if response.headers().contains_key(RATE_LIMIT_REMAINING) {
        Outcome::Denied
    } else {
        Outcome::Error
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
