//! Caller identification
//!
//! An identification function maps a request to the opaque string that
//! partitions counters. The default uses the client IP: the first parseable
//! address in `X-Forwarded-For`, otherwise the socket peer address recorded by
//! axum's `ConnectInfo`.

use crate::core::ThrottleError;
use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Shared identification function
pub type IdentifyFn = Arc<dyn Fn(&Request) -> Result<String, ThrottleError> + Send + Sync>;

/// Header consulted for a proxy-forwarded client address
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Identify the caller by IP address
///
/// # Errors
///
/// Returns [`ThrottleError::Identity`] when no forwarded address parses and
/// the request carries no peer address (the service was not served with
/// `into_make_service_with_connect_info`).
pub fn identify_by_ip(request: &Request) -> Result<String, ThrottleError> {
    if let Some(ip) = forwarded_ip(request.headers()) {
        return Ok(ip.to_string());
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or_else(|| {
            ThrottleError::Identity("no forwarded-for address and no peer address".to_string())
        })
}

/// Identify the caller by the value of a request header, such as an API key
///
/// Requests without the header, or with a non-text value, fail identification.
pub fn identify_by_header(
    name: impl Into<String>,
) -> impl Fn(&Request) -> Result<String, ThrottleError> + Send + Sync + 'static {
    let name = name.into();
    move |request: &Request| {
        request
            .headers()
            .get(name.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ThrottleError::Identity(format!("missing {name} header")))
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get_all(FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|candidate| candidate.trim().parse::<IpAddr>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http;

    fn request_with(forwarded: Option<&str>, peer: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/");
        if let Some(value) = forwarded {
            builder = builder.header(FORWARDED_FOR, value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(addr) = peer {
            let addr: SocketAddr = addr.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_forwarded_for_wins() {
        let request = request_with(Some("203.0.113.7"), Some("10.0.0.1:5000"));
        assert_eq!(identify_by_ip(&request).unwrap(), "203.0.113.7");
    }

    #[test]
    fn test_first_parseable_forwarded_entry() {
        let request = request_with(Some("unknown, 198.51.100.2, 10.0.0.3"), None);
        assert_eq!(identify_by_ip(&request).unwrap(), "198.51.100.2");
    }

    #[test]
    fn test_forwarded_ipv6_is_normalized() {
        let request = request_with(Some("2001:DB8::1"), None);
        assert_eq!(identify_by_ip(&request).unwrap(), "2001:db8::1");
    }

    #[test]
    fn test_invalid_forwarded_falls_back_to_peer() {
        let request = request_with(Some("not-an-ip"), Some("192.0.2.10:443"));
        assert_eq!(identify_by_ip(&request).unwrap(), "192.0.2.10");
    }

    #[test]
    fn test_peer_address_without_port() {
        let request = request_with(None, Some("[2001:db8::2]:8080"));
        assert_eq!(identify_by_ip(&request).unwrap(), "2001:db8::2");
    }

    #[test]
    fn test_no_address_is_an_error() {
        let request = request_with(Some("garbage"), None);
        assert!(matches!(
            identify_by_ip(&request),
            Err(ThrottleError::Identity(_))
        ));
    }

    #[test]
    fn test_identify_by_header() {
        let identify = identify_by_header("x-api-key");

        let request = http::Request::builder()
            .header("x-api-key", " key-123 ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(identify(&request).unwrap(), "key-123");

        let request = http::Request::builder().body(Body::empty()).unwrap();
        assert!(identify(&request).is_err());

        let request = http::Request::builder()
            .header("x-api-key", "")
            .body(Body::empty())
            .unwrap();
        assert!(identify(&request).is_err());
    }
}
