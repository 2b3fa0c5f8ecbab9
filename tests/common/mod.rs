// Shared fixtures for the HTTP integration tests.
#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, Response},
    Router,
};
use nowplaying::api::{create_router, AppState};
use nowplaying::config::{AppConfig, Tunables};
use nowplaying::credentials::Credentials;
use nowplaying::oauth::{ProviderConfig, DEFAULT_SCOPES};
use wiremock::MockServer;

pub const SESSION_SECRET: &str = "integration-test-secret";
pub const REDIRECT_URI: &str = "http://localhost:3000/api/callback";

/// Configuration whose provider endpoints all point at `server`.
pub fn test_config(server: &MockServer) -> AppConfig {
    AppConfig {
        provider: ProviderConfig {
            accounts_url: server.uri(),
            api_url: format!("{}/v1", server.uri()),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            client_id: "test-client".to_string(),
            client_secret: "test-client-secret".to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
        },
        session_secret: SESSION_SECRET.to_string(),
        port: 0,
        secure_cookies: false,
        tunables: Tunables::default(),
    }
}

pub fn build(config: &AppConfig) -> (Router, AppState) {
    let state = AppState::from_config(config).unwrap();
    (create_router(state.clone()), state)
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `Cookie` header value carrying a sealed session for `credentials`.
pub fn session_cookie(state: &AppState, credentials: &Credentials) -> String {
    let set_cookie = state.sessions.session_cookie(credentials).unwrap();
    cookie_pair(&set_cookie)
}

/// The `name=value` part of a `Set-Cookie` value.
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
