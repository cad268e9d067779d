use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Request};
use axum::http::{self, StatusCode};
use axum::response::Response;
use axum::{Router, routing::get};
use loopguard::{
    Clock, Counter, FORWARDED_FOR, ManualClock, MemoryStore, Options, Policy, Quota, RATE_LIMIT_LIMIT,
    RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, Store, ThrottleError, Ttl, identify_by_header,
    store_key,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

const START_SECS: u64 = 1_700_000_000;

fn start() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(START_SECS)
}

fn app(policy: Policy, hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route(
            "/",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "ok"
                }
            }),
        )
        .layer(policy)
}

fn request_from(ip: &str) -> Request {
    let mut request = http::Request::builder()
        .uri("/")
        .body(Body::empty())
        .unwrap();
    let addr: SocketAddr = format!("{ip}:40000").parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn header(response: &Response, name: &http::HeaderName) -> u64 {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing {name} header"))
        .to_str()
        .unwrap()
        .parse()
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_two_per_second_scenario() {
    let clock = ManualClock::new(start());
    let policy = Policy::new(
        Quota::new(2, Duration::from_secs(1)).unwrap(),
        Options::new().clock(Arc::new(clock.clone())),
    );
    let hits = Arc::new(AtomicUsize::new(0));
    let app = app(policy, hits.clone());

    // A at t=0
    let a = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(header(&a, &RATE_LIMIT_LIMIT), 2);
    assert_eq!(header(&a, &RATE_LIMIT_REMAINING), 1);
    assert_eq!(header(&a, &RATE_LIMIT_RESET), START_SECS + 1);
    assert_eq!(body_text(a).await, "ok");

    // B at t=0.1
    clock.advance(Duration::from_millis(100));
    let b = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
    assert_eq!(b.status(), StatusCode::OK);
    assert_eq!(header(&b, &RATE_LIMIT_REMAINING), 0);

    // C at t=0.2
    clock.advance(Duration::from_millis(100));
    let c = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
    assert_eq!(c.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&c, &RATE_LIMIT_LIMIT), 2);
    assert_eq!(header(&c, &RATE_LIMIT_REMAINING), 0);
    assert_eq!(header(&c, &RATE_LIMIT_RESET), START_SECS + 1);
    assert_eq!(body_text(c).await, "Too Many Requests");

    // D at t=1.1, a new window
    clock.advance(Duration::from_millis(900));
    let d = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
    assert_eq!(d.status(), StatusCode::OK);
    assert_eq!(header(&d, &RATE_LIMIT_REMAINING), 1);
    assert_eq!(header(&d, &RATE_LIMIT_RESET), START_SECS + 2);

    // The denied request never reached the handler
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_sixth_request_denied_with_reset() {
    let clock = ManualClock::new(start());
    let policy = Policy::new(
        Quota::new(5, Duration::from_secs(60)).unwrap(),
        Options::new().clock(Arc::new(clock.clone())),
    );
    let app = app(policy, Arc::new(AtomicUsize::new(0)));

    for expected_remaining in (0..5).rev() {
        let response = app.clone().oneshot(request_from("10.1.1.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, &RATE_LIMIT_REMAINING), expected_remaining);
        clock.advance(Duration::from_secs(5));
    }

    let response = app.clone().oneshot(request_from("10.1.1.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, &RATE_LIMIT_REMAINING), 0);
    assert_eq!(header(&response, &RATE_LIMIT_RESET), START_SECS + 60);
}

#[tokio::test]
async fn test_identities_are_independent() {
    let policy = Policy::new(Quota::per_minute(1).unwrap(), Options::new());
    let app = app(policy, Arc::new(AtomicUsize::new(0)));

    let first = app.clone().oneshot(request_from("192.0.2.1")).await.unwrap();
    let again = app.clone().oneshot(request_from("192.0.2.1")).await.unwrap();
    let other = app.clone().oneshot(request_from("192.0.2.2")).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_for_identifies_caller_behind_proxy() {
    let policy = Policy::new(Quota::per_minute(1).unwrap(), Options::new());
    let app = app(policy, Arc::new(AtomicUsize::new(0)));

    let mut first = request_from("10.0.0.1");
    first
        .headers_mut()
        .insert(FORWARDED_FOR, "203.0.113.5".parse().unwrap());
    let mut second = request_from("10.0.0.1");
    second
        .headers_mut()
        .insert(FORWARDED_FOR, "203.0.113.6".parse().unwrap());

    // Same proxy peer, different clients
    assert_eq!(app.clone().oneshot(first).await.unwrap().status(), StatusCode::OK);
    assert_eq!(app.clone().oneshot(second).await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_custom_status_and_message() {
    let policy = Policy::new(
        Quota::per_minute(1).unwrap(),
        Options::new()
            .status_code(StatusCode::SERVICE_UNAVAILABLE)
            .message("Slow down, please"),
    );
    let app = app(policy, Arc::new(AtomicUsize::new(0)));

    app.clone().oneshot(request_from("1.1.1.1")).await.unwrap();
    let denied = app.clone().oneshot(request_from("1.1.1.1")).await.unwrap();

    assert_eq!(denied.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(header(&denied, &RATE_LIMIT_REMAINING), 0);
    assert_eq!(body_text(denied).await, "Slow down, please");
}

#[tokio::test]
async fn test_disabled_policy_is_pass_through() {
    let store = Arc::new(MemoryStore::new());
    let policy = Policy::new(
        Quota::per_minute(1).unwrap(),
        Options::new().store(store.clone()).disabled(true),
    );
    assert!(policy.is_disabled());
    assert!(policy.check("1.2.3.4").unwrap().is_none());

    let hits = Arc::new(AtomicUsize::new(0));
    let app = app(policy, hits.clone());

    for _ in 0..20 {
        let response = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(RATE_LIMIT_LIMIT).is_none());
    }

    assert_eq!(hits.load(Ordering::SeqCst), 20);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_disabled_policy_needs_no_identity() {
    let policy = Policy::new(Quota::per_minute(1).unwrap(), Options::new().disabled(true));
    let app = app(policy, Arc::new(AtomicUsize::new(0)));

    let request = http::Request::builder().uri("/").body(Body::empty()).unwrap();
    assert_eq!(app.oneshot(request).await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unidentifiable_caller_fails_closed() {
    let hits = Arc::new(AtomicUsize::new(0));
    let policy = Policy::new(Quota::per_minute(100).unwrap(), Options::new());
    let app = app(policy, hits.clone());

    // No forwarded header, no ConnectInfo
    let request = http::Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_custom_identity_fails_closed() {
    let hits = Arc::new(AtomicUsize::new(0));
    let policy = Policy::new(
        Quota::per_minute(100).unwrap(),
        Options::new().identify_with(|_req| Ok(String::new())),
    );
    let app = app(policy, hits.clone());

    let response = app.oneshot(request_from("1.2.3.4")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_header_identification() {
    let policy = Policy::new(
        Quota::per_minute(1).unwrap(),
        Options::new().identify_with(identify_by_header("x-api-key")),
    );
    let app = app(policy, Arc::new(AtomicUsize::new(0)));

    let keyed = |key: &str| {
        http::Request::builder()
            .uri("/")
            .header("x-api-key", key)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(app.clone().oneshot(keyed("a")).await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        app.clone().oneshot(keyed("a")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(app.clone().oneshot(keyed("b")).await.unwrap().status(), StatusCode::OK);
}

/// Store whose reads always fail
struct UnavailableStore;

impl Store for UnavailableStore {
    fn get(&self, _key: &str, _now: SystemTime) -> Result<Option<Counter>, String> {
        Err("store unavailable".to_string())
    }

    fn set(&self, _key: &str, _value: Counter, _ttl: Ttl, _now: SystemTime) -> Result<(), String> {
        Err("store unavailable".to_string())
    }
}

#[tokio::test]
async fn test_store_failure_fails_closed() {
    let hits = Arc::new(AtomicUsize::new(0));
    let policy = Policy::new(
        Quota::per_minute(100).unwrap(),
        Options::new().store(Arc::new(UnavailableStore)),
    );
    assert!(matches!(policy.check("1.2.3.4"), Err(ThrottleError::Store(_))));

    let app = app(policy, hits.clone());
    let response = app.oneshot(request_from("1.2.3.4")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_policies_sharing_a_store_use_distinct_keys() {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(start());
    // Same window/limit ratio, different quotas
    let per_second = Quota::new(1, Duration::from_secs(1)).unwrap();
    let per_minute = Quota::new(60, Duration::from_secs(60)).unwrap();
    let options = Options::new()
        .store(store.clone())
        .clock(Arc::new(clock.clone()));

    let strict = Policy::new(per_second, options.clone());
    let loose = Policy::new(per_minute, options);

    assert!(strict.check("1.2.3.4").unwrap().unwrap().allowed);
    assert!(!strict.check("1.2.3.4").unwrap().unwrap().allowed);
    assert!(loose.check("1.2.3.4").unwrap().unwrap().allowed);

    let now = clock.now();
    assert_eq!(
        store
            .get(&store_key("throttle", &per_second, "1.2.3.4"), now)
            .unwrap()
            .map(|c| c.count()),
        Some(1)
    );
    assert_eq!(
        store
            .get(&store_key("throttle", &per_minute, "1.2.3.4"), now)
            .unwrap()
            .map(|c| c.count()),
        Some(1)
    );
}

#[tokio::test]
async fn test_route_layer_leaves_other_routes_alone() {
    let policy = Policy::new(Quota::per_minute(1).unwrap(), Options::new());
    let app = Router::new()
        .route("/limited", get(|| async { "limited" }))
        .route_layer(policy)
        .route("/free", get(|| async { "free" }));

    let limited = |ip: &str| {
        let mut request = request_from(ip);
        *request.uri_mut() = "/limited".parse().unwrap();
        request
    };
    let free = |ip: &str| {
        let mut request = request_from(ip);
        *request.uri_mut() = "/free".parse().unwrap();
        request
    };

    assert_eq!(app.clone().oneshot(limited("5.5.5.5")).await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        app.clone().oneshot(limited("5.5.5.5")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    for _ in 0..5 {
        let response = app.clone().oneshot(free("5.5.5.5")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(RATE_LIMIT_LIMIT).is_none());
    }
}
