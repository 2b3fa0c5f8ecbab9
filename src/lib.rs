// Sealed cookie codec and session credentials
pub mod credentials;

// Cookie-backed session reads and writes
pub mod session;

// OAuth provider client and state guard
pub mod oauth;

// Access token refresh
pub mod refresh;

// Per-client request rate limiting
pub mod rate_limit;

// Environment and tunables
pub mod config;

// HTTP API
pub mod api;
