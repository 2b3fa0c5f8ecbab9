// HTTP surface: OAuth login/callback/logout and the player read endpoints.

mod oauth;
mod player;

use crate::config::AppConfig;
use crate::credentials::CookieCodec;
use crate::oauth::{OAuthStateGuard, ProviderClient};
use crate::rate_limit::{client_identity, Admission, RateLimiter};
use crate::refresh::{Access, AccessError, TokenRefresher};
use crate::session::{SessionCodec, SessionRead};
use anyhow::Result;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

pub use player::{NowPlayingResponse, RecentItem, RecentResponse, TrackSummary};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provider: ProviderClient,
    pub sessions: SessionCodec,
    pub state_guard: OAuthStateGuard,
    pub refresher: Arc<TokenRefresher<ProviderClient>>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wire every component from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let codec = Arc::new(CookieCodec::new(&config.session_secret)?);
        let provider = ProviderClient::new(config.provider.clone(), config.tunables.upstream.timeout())?;
        let tunables = &config.tunables;

        Ok(Self {
            sessions: SessionCodec::new(Arc::clone(&codec), config.secure_cookies)
                .with_max_age(tunables.session.max_age_secs()),
            state_guard: OAuthStateGuard::new(codec),
            refresher: Arc::new(TokenRefresher::with_margin(
                Arc::new(provider.clone()),
                tunables.session.refresh_margin_ms,
            )),
            rate_limiter: Arc::new(RateLimiter::new(
                tunables.rate_limit.capacity,
                tunables.rate_limit.window(),
            )),
            provider,
        })
    }
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

/// Application error types
pub enum AppError {
    /// No usable session; carries cookie clears when a bad session was seen
    NotAuthenticated { set_cookies: Vec<String> },
    /// Limiter rejection
    RateLimited { retry_after_secs: u64 },
    /// OAuth callback failed state/code validation
    InvalidCallback,
    /// Provider or internal failure, reported with a generic code
    Failed {
        code: &'static str,
        set_cookies: Vec<String>,
    },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, set_cookies) = match self {
            AppError::NotAuthenticated { set_cookies } => {
                (StatusCode::UNAUTHORIZED, "not_authenticated", set_cookies)
            }
            AppError::RateLimited { retry_after_secs } => {
                let mut resp = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ErrorResponse {
                        error: "too_many_requests",
                    }),
                )
                    .into_response();
                resp.headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                return resp;
            }
            AppError::InvalidCallback => (StatusCode::BAD_REQUEST, "invalid_callback", Vec::new()),
            AppError::Failed { code, set_cookies } => {
                (StatusCode::INTERNAL_SERVER_ERROR, code, set_cookies)
            }
        };

        with_cookies(
            (status, Json(ErrorResponse { error })).into_response(),
            &set_cookies,
        )
    }
}

/// Create API router with every /api endpoint behind the rate limiter
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let api = Router::new()
        .route("/login", get(oauth::login))
        .route("/callback", get(oauth::callback))
        .route("/logout", get(oauth::logout))
        .route("/recent", get(player::recent))
        .route("/now-playing", get(player::now_playing))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            enforce_rate_limit,
        ))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

/// Admission control for every /api request.
async fn enforce_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), peer);

    match state.rate_limiter.admit(&identity) {
        Admission::Allowed => next.run(request).await,
        Admission::Limited { retry_after_secs } => {
            debug!(identity = %identity, retry_after_secs, "Request rate limited");
            AppError::RateLimited { retry_after_secs }.into_response()
        }
    }
}

/// Access token for one request, plus a rewritten session cookie if it changed
pub(crate) struct Authorized {
    pub access_token: String,
    pub set_cookies: Vec<String>,
}

/// Resolve the request's session into a usable access token.
///
/// `failure_code` is the generic error code reported if the refresh call fails.
pub(crate) async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    failure_code: &'static str,
) -> Result<Authorized, AppError> {
    let credentials = match state.sessions.read(headers) {
        SessionRead::Present(credentials) => credentials,
        SessionRead::Absent => {
            return Err(AppError::NotAuthenticated {
                set_cookies: Vec::new(),
            })
        }
        SessionRead::Invalid => {
            debug!("Discarding unreadable session cookie");
            return Err(AppError::NotAuthenticated {
                set_cookies: state.sessions.clear_all(),
            });
        }
    };

    match state.refresher.ensure_access(&credentials).await {
        Ok(Access {
            access_token,
            renewed: None,
        }) => Ok(Authorized {
            access_token,
            set_cookies: Vec::new(),
        }),
        Ok(Access {
            access_token,
            renewed: Some(renewed),
        }) => {
            let cookie = state.sessions.session_cookie(&renewed).map_err(|e| {
                error!(error = %e, "Failed to seal renewed session");
                AppError::Failed {
                    code: failure_code,
                    set_cookies: state.sessions.clear_all(),
                }
            })?;
            Ok(Authorized {
                access_token,
                set_cookies: vec![cookie],
            })
        }
        Err(AccessError::NotAuthenticated) => {
            debug!("Session expired without refresh token");
            Err(AppError::NotAuthenticated {
                set_cookies: state.sessions.clear_all(),
            })
        }
        Err(AccessError::Upstream(e)) => {
            warn!(error = %e, "Refresh failed, clearing session");
            Err(AppError::Failed {
                code: failure_code,
                set_cookies: state.sessions.clear_all(),
            })
        }
    }
}

/// Append each value as its own `Set-Cookie` header.
pub(crate) fn with_cookies(mut response: Response, cookies: &[String]) -> Response {
    for cookie in cookies {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Skipping unrepresentable Set-Cookie value"),
        }
    }
    response
}
