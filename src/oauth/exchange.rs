//! Provider HTTP client.
//!
//! Handles exchanging authorization codes for tokens, refreshing access tokens,
//! and bearer-authenticated Web API reads. Every call is bounded by the client
//! timeout; a timed-out call is reported as [`UpstreamError::Timeout`] and is
//! never retried here.

use super::ProviderConfig;
use crate::refresh::TokenEndpoint;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Lifetime assumed when the token response omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

fn default_expires_in() -> i64 {
    DEFAULT_EXPIRES_IN_SECS
}

impl TokenGrant {
    /// Absolute expiry in epoch milliseconds for a grant received at `now_ms`.
    pub fn expires_at(&self, now_ms: i64) -> i64 {
        now_ms.saturating_add(self.expires_in.saturating_mul(1000))
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

/// Failures talking to the provider
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamError {
    /// No response within the client timeout
    Timeout,
    /// Provider answered with a non-success status
    Status { status: u16, body: String },
    /// Connection-level failure
    Transport(String),
    /// Response body could not be parsed
    Decode(String),
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Timeout => write!(f, "Provider request timed out"),
            UpstreamError::Status { status, body } => {
                write!(f, "Provider returned status {}: {}", status, body)
            }
            UpstreamError::Transport(msg) => write!(f, "Provider request failed: {}", msg),
            UpstreamError::Decode(msg) => write!(f, "Failed to parse provider response: {}", msg),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

/// Shared client for the provider's accounts service and Web API.
#[derive(Clone, Debug)]
pub struct ProviderClient {
    http: reqwest::Client,
    config: Arc<ProviderConfig>,
}

impl ProviderClient {
    /// Build a client whose every request is cancelled after `timeout`.
    pub fn new(config: ProviderConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build provider HTTP client")?;

        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Exchange authorization code for tokens
    ///
    /// # Arguments
    /// * `code` - Authorization code from callback
    ///
    /// # Returns
    /// * `Ok(TokenGrant)` - Access token, optional refresh token, lifetime
    /// * `Err` - If the provider rejects the code or cannot be reached
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, UpstreamError> {
        tracing::debug!("Exchanging authorization code at {}", self.config.token_endpoint());

        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    /// Trade a refresh token for a new access token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenGrant, UpstreamError> {
        tracing::debug!("Refreshing access token at {}", self.config.token_endpoint());

        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, UpstreamError> {
        // Client credentials travel as HTTP Basic auth, not in the form body
        let response = self
            .http
            .post(self.config.token_endpoint())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let grant: TokenGrant = response.json().await?;

        tracing::debug!(
            has_refresh_token = grant.refresh_token.is_some(),
            expires_in = grant.expires_in,
            "Token request successful"
        );

        Ok(grant)
    }

    /// Bearer-authenticated GET against the Web API.
    ///
    /// Returns `Ok(None)` for `204 No Content` when `allow_no_content` is set.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
        allow_no_content: bool,
    ) -> Result<Option<T>, UpstreamError> {
        let response = self
            .http
            .get(self.config.api_endpoint(path))
            .bearer_auth(access_token)
            .send()
            .await?;

        if allow_no_content && response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        Ok(Some(response.json().await?))
    }
}

impl TokenEndpoint for ProviderClient {
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenGrant, UpstreamError>> + Send {
        self.refresh_access_token(refresh_token)
    }
}

/// Turns a non-success response into [`UpstreamError::Status`], keeping the body
/// for server-side logs.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(UpstreamError::Status { status, body })
}
