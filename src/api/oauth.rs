// OAuth endpoints: login redirect, provider callback, logout.

use super::{with_cookies, AppError, AppState};
use crate::credentials::Credentials;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Query parameters for the login endpoint
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// `1` forces the provider's consent dialog (account switching)
    #[serde(default)]
    pub switch: Option<String>,
}

/// Query parameters the provider sends back to the callback
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Set by the provider when the user denied access
    #[serde(default)]
    pub error: Option<String>,
}

/// Start the authorization flow.
///
/// GET /api/login[?switch=1]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let issued = state.state_guard.issue();
    let force_dialog = query.switch.as_deref() == Some("1");
    let auth_url = state
        .provider
        .config()
        .build_auth_url(&issued.state, force_dialog);

    info!(force_dialog, "Redirecting to provider authorization");

    with_cookies(
        Redirect::temporary(&auth_url).into_response(),
        &[state.sessions.state_cookie(&issued.cookie_value)],
    )
}

/// Handle the provider redirect.
///
/// GET /api/callback?code=...&state=...
///
/// The state cookie must verify against the echoed state before any token
/// exchange takes place.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    if let Some(provider_error) = query.error.as_deref() {
        warn!(error = %provider_error, "Provider returned authorization error");
        return Err(AppError::InvalidCallback);
    }

    let (Some(code), Some(received_state)) = (
        query.code.as_deref().filter(|c| !c.is_empty()),
        query.state.as_deref(),
    ) else {
        warn!("Callback missing code or state");
        return Err(AppError::InvalidCallback);
    };

    let cookie_state = state.sessions.read_state(&headers).unwrap_or_default();
    if !state.state_guard.verify(&cookie_state, received_state) {
        warn!("Callback state did not match signed state cookie");
        return Err(AppError::InvalidCallback);
    }

    // Expiry is measured from before the exchange so network time never extends it
    let now_ms = chrono::Utc::now().timestamp_millis();
    let grant = state.provider.exchange_code(code).await.map_err(|e| {
        error!(error = %e, "Token exchange failed");
        AppError::Failed {
            code: "auth_failed",
            set_cookies: Vec::new(),
        }
    })?;

    let credentials = Credentials::from_grant(grant, now_ms);
    let session_cookie = state.sessions.session_cookie(&credentials).map_err(|e| {
        error!(error = %e, "Failed to seal new session");
        AppError::Failed {
            code: "auth_failed",
            set_cookies: Vec::new(),
        }
    })?;

    info!("Login completed");

    Ok(with_cookies(
        Redirect::to("/").into_response(),
        &[session_cookie, state.sessions.clear_state()],
    ))
}

/// Drop the session.
///
/// GET /api/logout
pub async fn logout(State(state): State<Arc<AppState>>) -> Response {
    with_cookies(
        Redirect::to("/").into_response(),
        &state.sessions.clear_all(),
    )
}
