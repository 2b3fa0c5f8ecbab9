// Integration tests for /api rate limiting.
//
// Requests go through the full router; only the limiter's capacity is shrunk
// so the window can be exhausted quickly.

mod common;

use axum::http::{header, StatusCode};
use common::{build, get, json_body, test_config};
use tower::ServiceExt;
use wiremock::MockServer;

fn from(ip: &str, uri: &str) -> axum::http::Request<axum::body::Body> {
    let mut request = get(uri, None);
    request
        .headers_mut()
        .insert("x-forwarded-for", ip.parse().unwrap());
    request
}

/// Requests within the limit are served normally; the next one is rejected.
#[tokio::test]
async fn test_limit_exceeded_returns_429_with_retry_after() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.tunables.rate_limit.capacity = 3;
    let (app, _) = build(&config);

    for i in 0..3 {
        let resp = app
            .clone()
            .oneshot(from("198.51.100.1", "/api/recent"))
            .await
            .unwrap();
        // No session, so the handler answers 401; the limiter let it through
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "request {}", i + 1);
    }

    let resp = app
        .clone()
        .oneshot(from("198.51.100.1", "/api/recent"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = resp
        .headers()
        .get(header::RETRY_AFTER)
        .expect("Retry-After header must be present")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after), "retry_after = {}", retry_after);

    let body = json_body(resp).await;
    assert_eq!(body, serde_json::json!({"error": "too_many_requests"}));
}

/// Every /api route shares the same per-client budget.
#[tokio::test]
async fn test_budget_spans_all_api_routes() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.tunables.rate_limit.capacity = 2;
    let (app, _) = build(&config);

    let first = app
        .clone()
        .oneshot(from("198.51.100.2", "/api/login"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::TEMPORARY_REDIRECT);

    let second = app
        .clone()
        .oneshot(from("198.51.100.2", "/api/logout"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::SEE_OTHER);

    let third = app
        .clone()
        .oneshot(from("198.51.100.2", "/api/now-playing"))
        .await
        .unwrap();
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
}

/// Exhausting one client's window does not affect another client.
#[tokio::test]
async fn test_clients_are_limited_independently() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.tunables.rate_limit.capacity = 1;
    let (app, _) = build(&config);

    let ok = app
        .clone()
        .oneshot(from("203.0.113.10", "/api/recent"))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::UNAUTHORIZED);

    let limited = app
        .clone()
        .oneshot(from("203.0.113.10", "/api/recent"))
        .await
        .unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app
        .clone()
        .oneshot(from("203.0.113.11", "/api/recent"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::UNAUTHORIZED);
}

/// Only the first X-Forwarded-For hop identifies the client.
#[tokio::test]
async fn test_forwarded_chain_uses_first_hop() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.tunables.rate_limit.capacity = 1;
    let (app, _) = build(&config);

    let ok = app
        .clone()
        .oneshot(from("192.0.2.50, 10.0.0.1", "/api/recent"))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::UNAUTHORIZED);

    // Same client behind a different proxy hop
    let limited = app
        .clone()
        .oneshot(from("192.0.2.50, 10.0.0.2", "/api/recent"))
        .await
        .unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
}
