//! Credential record carried in the sealed session cookie.
//!
//! The server keeps no copy of these credentials between requests. The record
//! is created at the OAuth callback, replaced wholesale on every refresh, and
//! destroyed when the cookie expires or the user logs out.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       SessionCodec                       │
//! │  - session / oauth_state cookies         │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!      (seal)              (unseal)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       CookieCodec                        │
//! │  - AES-256-GCM, fresh nonce per seal     │
//! │  - HMAC-SHA256 signed values             │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Browser cookie jar                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Security
//!
//! - Authenticated encryption (tampering detected, never partially trusted)
//! - Each seal uses a unique random nonce
//! - `Debug` output redacts tokens

use crate::oauth::TokenGrant;
use serde::{Deserialize, Serialize};

mod encryption;

pub use encryption::{constant_time_eq, CookieCodec};

/// OAuth credentials for the delegated provider account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// OAuth access token (used as the bearer for provider API calls)
    pub access_token: String,

    /// OAuth refresh token (used to obtain new access tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires, epoch milliseconds
    #[serde(default)]
    pub expires_at: i64,
}

impl Credentials {
    /// Build a fresh record from a token endpoint response received at `now_ms`.
    pub fn from_grant(grant: TokenGrant, now_ms: i64) -> Self {
        Self {
            expires_at: grant.expires_at(now_ms),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.filter(|token| !token.is_empty()),
        }
    }

    /// Copy-with-update after a refresh.
    ///
    /// The previous refresh token survives only when the provider did not
    /// rotate it.
    pub fn renewed(&self, grant: TokenGrant, now_ms: i64) -> Self {
        Self {
            expires_at: grant.expires_at(now_ms),
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .filter(|token| !token.is_empty())
                .or_else(|| self.refresh_token.clone()),
        }
    }

    /// True once `now_ms` is within `margin_ms` of expiry.
    pub fn is_stale(&self, now_ms: i64, margin_ms: i64) -> bool {
        now_ms >= self.expires_at.saturating_sub(margin_ms)
    }

    /// Usable refresh token, if any.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|token| !token.is_empty())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[redacted]")
            .field("has_refresh_token", &self.refresh_token().is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenGrant {
        TokenGrant {
            access_token: access.to_string(),
            refresh_token: refresh.map(|r| r.to_string()),
            expires_in,
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn test_from_grant_computes_expiry() {
        let creds = Credentials::from_grant(grant("at", Some("rt"), 3600), 1_000);
        assert_eq!(creds.access_token, "at");
        assert_eq!(creds.refresh_token(), Some("rt"));
        assert_eq!(creds.expires_at, 1_000 + 3_600_000);
    }

    #[test]
    fn test_renewed_keeps_refresh_token_when_omitted() {
        let old = Credentials {
            access_token: "old".to_string(),
            refresh_token: Some("rt-1".to_string()),
            expires_at: 0,
        };

        let renewed = old.renewed(grant("new", None, 60), 5_000);
        assert_eq!(renewed.access_token, "new");
        assert_eq!(renewed.refresh_token(), Some("rt-1"));
        assert_eq!(renewed.expires_at, 65_000);

        let rotated = old.renewed(grant("new", Some("rt-2"), 60), 5_000);
        assert_eq!(rotated.refresh_token(), Some("rt-2"));
        // Source record untouched
        assert_eq!(old.access_token, "old");
    }

    #[test]
    fn test_staleness_margin() {
        let creds = Credentials {
            access_token: "at".to_string(),
            refresh_token: None,
            expires_at: 100_000,
        };

        assert!(!creds.is_stale(69_999, 30_000));
        assert!(creds.is_stale(70_000, 30_000));
        assert!(creds.is_stale(200_000, 30_000));
    }

    #[test]
    fn test_serialized_field_names() {
        let creds = Credentials {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at: 42,
        };

        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["access_token"], "at");
        assert_eq!(json["refresh_token"], "rt");
        assert_eq!(json["expires_at"], 42);

        let minimal: Credentials = serde_json::from_str(r#"{"access_token":"at"}"#).unwrap();
        assert_eq!(minimal.refresh_token, None);
        assert_eq!(minimal.expires_at, 0);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let creds = Credentials {
            access_token: "super-secret".to_string(),
            refresh_token: Some("also-secret".to_string()),
            expires_at: 1,
        };

        let debug = format!("{:?}", creds);
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("also-secret"));
    }
}
