//! Client-held session: the sealed `session` cookie and the signed
//! `oauth_state` cookie.
//!
//! The sealed cookie is the only source of truth for a user's credentials.
//! Decoding failures never surface as distinct errors; a tampered or stale
//! cookie reads the same as an invalid one so the response cannot be used as
//! an oracle.

use crate::credentials::{CookieCodec, Credentials};
use anyhow::Result;
use axum::http::HeaderMap;
use std::sync::Arc;

mod cookies;

pub use cookies::{parse_cookies, serialize_cookie, CookieAttributes};

/// Cookie carrying the sealed credential record
pub const SESSION_COOKIE: &str = "session";

/// Cookie carrying the signed OAuth state
pub const STATE_COOKIE: &str = "oauth_state";

/// Default session lifetime (30 days)
pub const DEFAULT_SESSION_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 30;

/// OAuth state lifetime (10 minutes)
pub const STATE_MAX_AGE_SECS: i64 = 60 * 10;

/// What the request's session cookie turned out to hold
#[derive(Debug, Clone, PartialEq)]
pub enum SessionRead {
    /// No session cookie at all
    Absent,
    /// A cookie that failed to unseal, or held no access token
    Invalid,
    /// Decoded credentials
    Present(Credentials),
}

/// Reads and writes the session and OAuth state cookies.
#[derive(Debug, Clone)]
pub struct SessionCodec {
    codec: Arc<CookieCodec>,
    secure: bool,
    session_max_age_secs: i64,
}

impl SessionCodec {
    pub fn new(codec: Arc<CookieCodec>, secure: bool) -> Self {
        Self {
            codec,
            secure,
            session_max_age_secs: DEFAULT_SESSION_MAX_AGE_SECS,
        }
    }

    pub fn with_max_age(mut self, session_max_age_secs: i64) -> Self {
        self.session_max_age_secs = session_max_age_secs;
        self
    }

    /// Decode the session cookie of a request.
    pub fn read(&self, headers: &HeaderMap) -> SessionRead {
        let Some(token) = parse_cookies(headers).remove(SESSION_COOKIE) else {
            return SessionRead::Absent;
        };
        if token.is_empty() {
            return SessionRead::Absent;
        }

        match self.codec.unseal::<Credentials>(&token) {
            Some(credentials) if !credentials.access_token.is_empty() => {
                SessionRead::Present(credentials)
            }
            _ => SessionRead::Invalid,
        }
    }

    /// Raw `oauth_state` cookie value of a request, if any.
    pub fn read_state(&self, headers: &HeaderMap) -> Option<String> {
        parse_cookies(headers).remove(STATE_COOKIE)
    }

    /// `Set-Cookie` value storing sealed `credentials`.
    pub fn session_cookie(&self, credentials: &Credentials) -> Result<String> {
        let token = self.codec.seal(credentials)?;
        Ok(serialize_cookie(
            SESSION_COOKIE,
            &token,
            self.attributes(self.session_max_age_secs),
        ))
    }

    /// `Set-Cookie` value storing a signed OAuth state.
    pub fn state_cookie(&self, signed_state: &str) -> String {
        serialize_cookie(
            STATE_COOKIE,
            signed_state,
            self.attributes(STATE_MAX_AGE_SECS),
        )
    }

    /// `Set-Cookie` value expiring the OAuth state cookie.
    pub fn clear_state(&self) -> String {
        serialize_cookie(STATE_COOKIE, "", self.attributes(0))
    }

    /// `Set-Cookie` values expiring both cookies.
    pub fn clear_all(&self) -> Vec<String> {
        vec![
            serialize_cookie(SESSION_COOKIE, "", self.attributes(0)),
            self.clear_state(),
        ]
    }

    fn attributes(&self, max_age_secs: i64) -> CookieAttributes {
        CookieAttributes {
            max_age_secs,
            secure: self.secure,
        }
    }
}
