use super::{Enforcer, Policy};
use crate::core::{Decision, ThrottleError};
use axum::extract::Request;
use axum::http::header::HeaderName;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::UNIX_EPOCH;
use tower::{Layer, Service};

/// Quota limit of the policy that handled the request
pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("rate-limit-limit");
/// Accesses left in the caller's current window
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("rate-limit-remaining");
/// End of the caller's current window, in epoch seconds
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("rate-limit-reset");

impl<S> Layer<S> for Policy {
    type Service = PolicyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PolicyService {
            inner,
            enforcer: self.enforcer.clone(),
        }
    }
}

/// Service produced by applying a [`Policy`] layer
#[derive(Clone)]
pub struct PolicyService<S> {
    inner: S,
    enforcer: Option<Arc<Enforcer>>,
}

impl<S> Service<Request> for PolicyService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let Some(enforcer) = &self.enforcer else {
            return Box::pin(self.inner.call(request));
        };

        match enforcer.admit(&request) {
            Ok(decision) if decision.allowed => {
                let future = self.inner.call(request);
                Box::pin(async move {
                    let mut response = future.await?;
                    set_rate_limit_headers(response.headers_mut(), &decision);
                    Ok(response)
                })
            }
            Ok(decision) => {
                tracing::debug!(
                    path = %request.uri().path(),
                    limit = decision.limit,
                    "Request throttled"
                );
                let response = enforcer.denied_response(&decision);
                Box::pin(async move { Ok(response) })
            }
            Err(error) => {
                log_failure(&error, &request);
                Box::pin(async move { Ok(internal_error()) })
            }
        }
    }
}

impl Enforcer {
    fn denied_response(&self, decision: &Decision) -> Response {
        let mut response = (self.status_code, self.message.clone()).into_response();
        set_rate_limit_headers(response.headers_mut(), decision);
        response
    }
}

fn set_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    let reset = decision
        .reset_at
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs())
        .unwrap_or(0);

    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(reset));
}

fn log_failure(error: &ThrottleError, request: &Request) {
    match error {
        ThrottleError::Identity(_) => {
            tracing::error!(path = %request.uri().path(), %error, "Cannot identify caller")
        }
        _ => tracing::error!(path = %request.uri().path(), %error, "Admission check failed"),
    }
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}
