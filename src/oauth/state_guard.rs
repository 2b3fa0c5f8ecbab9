//! OAuth state handling for CSRF protection.
//!
//! The state parameter travels twice: in the clear through the provider's
//! redirect, and signed in the `oauth_state` cookie. The callback is accepted
//! only when both copies agree, so no server-side state table is needed.

use crate::credentials::{constant_time_eq, CookieCodec};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use rand::RngCore;
use std::sync::Arc;

/// Random bytes per state token (encodes to 24 base64url characters)
const STATE_BYTES: usize = 18;

/// A freshly issued state and the cookie value that vouches for it
#[derive(Clone, Debug)]
pub struct IssuedState {
    /// Raw state, embedded in the authorization URL
    pub state: String,
    /// Signed state, stored in the `oauth_state` cookie
    pub cookie_value: String,
}

/// Issues and verifies signed OAuth state tokens
#[derive(Clone, Debug)]
pub struct OAuthStateGuard {
    codec: Arc<CookieCodec>,
}

impl OAuthStateGuard {
    pub fn new(codec: Arc<CookieCodec>) -> Self {
        Self { codec }
    }

    /// Generate a new random state and its signed cookie value.
    pub fn issue(&self) -> IssuedState {
        let mut bytes = [0u8; STATE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let state = BASE64URL.encode(bytes);
        let cookie_value = self.codec.sign_value(&state);

        IssuedState {
            state,
            cookie_value,
        }
    }

    /// Check the state echoed by the provider against the signed cookie.
    ///
    /// Fails when either side is empty, the cookie signature does not verify,
    /// or the values differ.
    pub fn verify(&self, cookie_value: &str, received_state: &str) -> bool {
        if cookie_value.is_empty() || received_state.is_empty() {
            return false;
        }

        let Some(expected) = self.codec.unsign_value(cookie_value) else {
            return false;
        };

        constant_time_eq(&expected, received_state)
    }
}
