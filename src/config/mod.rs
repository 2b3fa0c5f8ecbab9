use crate::oauth::{ProviderConfig, DEFAULT_SCOPES};
use serde::Deserialize;
use std::time::Duration;

/// Environment variables that must be set for the service to start
pub const REQUIRED_VARS: [&str; 4] = [
    "SPOTIFY_CLIENT_ID",
    "SPOTIFY_CLIENT_SECRET",
    "SPOTIFY_REDIRECT_URI",
    "SESSION_SECRET",
];

const DEFAULT_PORT: u16 = 3000;

/// Longest accepted rate-limit window (one day)
pub const MAX_WINDOW_SECONDS: u64 = 24 * 60 * 60;

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub session_secret: String,
    pub port: u16,
    /// Mark cookies `Secure` (production deployments behind HTTPS)
    pub secure_cookies: bool,
    pub tunables: Tunables,
}

/// Optional tuning knobs, loaded from the TOML file named by `NOWPLAYING_CONFIG`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tunables {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_window_seconds() -> u64 {
    60
}

fn default_capacity() -> u32 {
    80
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            capacity: default_capacity(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Tunables {
    /// Reject values that would disable a safeguard or overflow the clock.
    pub fn validate(&self) -> Result<(), String> {
        let window = self.rate_limit.window_seconds;
        if window == 0 || window > MAX_WINDOW_SECONDS {
            return Err(format!(
                "rate_limit.window_seconds must be between 1 and {}, got {}",
                MAX_WINDOW_SECONDS, window
            ));
        }
        if self.rate_limit.capacity == 0 {
            return Err("rate_limit.capacity must be at least 1".to_string());
        }
        if self.upstream.timeout_seconds == 0 {
            return Err("upstream.timeout_seconds must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Provider endpoints and call budget
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Per-call timeout for every provider request (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_accounts_url")]
    pub accounts_url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_timeout_seconds() -> u64 {
    12
}

fn default_accounts_url() -> String {
    "https://accounts.spotify.com".to_string()
}

fn default_api_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            accounts_url: default_accounts_url(),
            api_url: default_api_url(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    /// Access tokens this close to expiry are refreshed early (milliseconds)
    #[serde(default = "default_refresh_margin_ms")]
    pub refresh_margin_ms: i64,
}

fn default_max_age_days() -> i64 {
    30
}

fn default_refresh_margin_ms() -> i64 {
    30_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            refresh_margin_ms: default_refresh_margin_ms(),
        }
    }
}

impl SessionConfig {
    pub fn max_age_secs(&self) -> i64 {
        self.max_age_days.saturating_mul(24 * 60 * 60)
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    /// Required environment variables are unset or empty
    Missing(Vec<&'static str>),
    /// PORT is not a valid port number
    InvalidPort(String),
    /// Tunables file could not be read or parsed
    Tunables(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(names) => {
                write!(f, "Missing required environment variables: {}", names.join(", "))
            }
            ConfigError::InvalidPort(value) => write!(f, "PORT must be a valid port number, got '{}'", value),
            ConfigError::Tunables(msg) => write!(f, "Failed to load tunables: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let missing: Vec<&'static str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|name| get(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let port = match get("PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(value.clone()))?,
            None => DEFAULT_PORT,
        };

        let secure_cookies = get("APP_ENV").is_some_and(|env| env == "production")
            || get("NOWPLAYING_SECURE_COOKIES")
                .and_then(|value| value.parse::<bool>().ok())
                .unwrap_or(false);

        let tunables = match get("NOWPLAYING_CONFIG") {
            Some(path) => {
                load_tunables(&path).map_err(|e| ConfigError::Tunables(e.to_string()))?
            }
            None => Tunables::default(),
        };
        tunables.validate().map_err(ConfigError::Tunables)?;

        let required = |name: &str| get(name).unwrap_or_default();
        let provider = ProviderConfig {
            accounts_url: tunables.upstream.accounts_url.clone(),
            api_url: tunables.upstream.api_url.clone(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            client_id: required("SPOTIFY_CLIENT_ID"),
            client_secret: required("SPOTIFY_CLIENT_SECRET"),
            redirect_uri: required("SPOTIFY_REDIRECT_URI"),
        };

        Ok(Self {
            provider,
            session_secret: required("SESSION_SECRET"),
            port,
            secure_cookies,
            tunables,
        })
    }
}

/// Load tunables from TOML file
pub fn load_tunables(path: &str) -> Result<Tunables, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let tunables: Tunables = toml::from_str(&contents)?;
    Ok(tunables)
}
