//! Lazy access-token renewal.
//!
//! Refresh only ever happens on the request path: a request carrying stale
//! credentials triggers one call to the token endpoint and receives a renewed
//! record to re-seal into its cookie. Requests that race on the same refresh
//! token share a single in-flight call.

use crate::credentials::Credentials;
use crate::oauth::{TokenGrant, UpstreamError};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};


/// Renewal margin before nominal expiry (30 seconds in milliseconds)
pub const DEFAULT_REFRESH_MARGIN_MS: i64 = 30_000;

/// Anything that can trade a refresh token for a new grant.
pub trait TokenEndpoint: Send + Sync + 'static {
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenGrant, UpstreamError>> + Send;
}

/// A usable access token for the current request
#[derive(Clone, Debug)]
pub struct Access {
    pub access_token: String,
    /// Replacement record when a refresh happened; the caller must re-seal it
    pub renewed: Option<Credentials>,
}

/// Why no access token could be produced.
///
/// Both variants mean the session cookie should be cleared.
#[derive(Clone, Debug, PartialEq)]
pub enum AccessError {
    /// Stale credentials and nothing to refresh them with
    NotAuthenticated,
    /// The token endpoint rejected the refresh or could not be reached
    Upstream(UpstreamError),
}

impl std::fmt::Display for AccessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessError::NotAuthenticated => write!(f, "not_authenticated"),
            AccessError::Upstream(e) => write!(f, "Token refresh failed: {}", e),
        }
    }
}

impl std::error::Error for AccessError {}

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenGrant, UpstreamError>>>;

/// Returns valid access tokens, refreshing stale credentials on demand.
pub struct TokenRefresher<E> {
    endpoint: Arc<E>,
    margin_ms: i64,
    /// In-flight refreshes keyed by refresh token
    in_flight: DashMap<String, SharedRefresh>,
}

impl<E: TokenEndpoint> TokenRefresher<E> {
    pub fn new(endpoint: Arc<E>) -> Self {
        Self::with_margin(endpoint, DEFAULT_REFRESH_MARGIN_MS)
    }

    pub fn with_margin(endpoint: Arc<E>, margin_ms: i64) -> Self {
        Self {
            endpoint,
            margin_ms,
            in_flight: DashMap::new(),
        }
    }

    /// Ensure `credentials` yield a usable access token as of now.
    pub async fn ensure_access(&self, credentials: &Credentials) -> Result<Access, AccessError> {
        self.ensure_access_at(credentials, now_ms()).await
    }

    /// [`ensure_access`](Self::ensure_access) against a fixed clock.
    pub async fn ensure_access_at(
        &self,
        credentials: &Credentials,
        now_ms: i64,
    ) -> Result<Access, AccessError> {
        if !credentials.is_stale(now_ms, self.margin_ms) {
            return Ok(fresh(credentials));
        }

        let refresh_token = credentials
            .refresh_token()
            .ok_or(AccessError::NotAuthenticated)?;
        let grant = self.refresh_coalesced(refresh_token).await?;

        Ok(renewed(credentials, grant, now_ms))
    }

    /// Number of refreshes currently awaiting the token endpoint.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    async fn refresh_coalesced(&self, refresh_token: &str) -> Result<TokenGrant, AccessError> {
        let flight = self
            .in_flight
            .entry(refresh_token.to_string())
            .or_insert_with(|| {
                debug!("Access token stale, starting refresh");
                let endpoint = Arc::clone(&self.endpoint);
                let token = refresh_token.to_string();
                async move { endpoint.refresh(&token).await }
                    .boxed()
                    .shared()
            })
            .value()
            .clone();

        let mut guard = FlightGuard {
            in_flight: &self.in_flight,
            key: refresh_token,
            flight,
        };

        match (&mut guard.flight).await {
            Ok(grant) => {
                info!(
                    rotated_refresh_token = grant.refresh_token.is_some(),
                    expires_in = grant.expires_in,
                    "Access token refreshed"
                );
                Ok(grant)
            }
            Err(e) => {
                warn!(error = %e, "Access token refresh failed");
                Err(AccessError::Upstream(e))
            }
        }
    }
}

/// One waiter's handle on a shared refresh.
///
/// On drop the map entry is removed once the flight has resolved, or when
/// this waiter is the last holder besides the map. A cancelled waiter never
/// evicts a flight other requests are still waiting on.
struct FlightGuard<'a> {
    in_flight: &'a DashMap<String, SharedRefresh>,
    key: &'a str,
    flight: SharedRefresh,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let flight = &self.flight;
        // Joiners clone under the entry lock, so the count is stable here.
        // A clone polled to completion releases its handle, hence the checks
        // run against the map's copy.
        self.in_flight.remove_if(self.key, |_, current| {
            current.peek().is_some()
                || (current.ptr_eq(flight) && current.strong_count() == Some(2))
        });
    }
}

fn fresh(credentials: &Credentials) -> Access {
    Access {
        access_token: credentials.access_token.clone(),
        renewed: None,
    }
}

fn renewed(credentials: &Credentials, grant: TokenGrant, now_ms: i64) -> Access {
    let record = credentials.renewed(grant, now_ms);
    Access {
        access_token: record.access_token.clone(),
        renewed: Some(record),
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
