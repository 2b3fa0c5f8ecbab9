//! OAuth 2.0 authorization-code flow against the provider.
//!
//! Implements the authorization code flow:
//! 1. Browser hits GET /api/login → signed state cookie, redirect to provider
//! 2. User authorizes on the provider's site
//! 3. Provider redirects to /api/callback with `code` and `state`
//! 4. State is checked against the signed cookie
//! 5. Code is exchanged for tokens, credentials are sealed into the session cookie

mod exchange;
mod provider;
mod state_guard;

pub use exchange::{ProviderClient, TokenGrant, UpstreamError};
pub use provider::{ProviderConfig, DEFAULT_SCOPES};
pub use state_guard::{IssuedState, OAuthStateGuard};
