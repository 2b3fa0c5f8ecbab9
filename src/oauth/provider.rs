//! OAuth provider configuration.
//!
//! Endpoints, client credentials, and scopes for the single supported
//! authorization-code provider.

use serde::{Deserialize, Serialize};

/// Scopes requested at authorization time
pub const DEFAULT_SCOPES: &[&str] = &["user-read-recently-played", "user-read-currently-playing"];

/// OAuth provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Accounts service base URL (hosts `/authorize` and `/api/token`)
    pub accounts_url: String,

    /// Web API base URL (data calls are relative to this)
    pub api_url: String,

    /// Required OAuth scopes
    pub scopes: Vec<String>,

    /// Client ID
    pub client_id: String,

    /// Client secret
    pub client_secret: String,

    /// Redirect URI registered with the provider
    pub redirect_uri: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("accounts_url", &self.accounts_url)
            .field("api_url", &self.api_url)
            .field("scopes", &self.scopes)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

impl ProviderConfig {
    /// Authorization endpoint URL
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/authorize", self.accounts_url.trim_end_matches('/'))
    }

    /// Token exchange endpoint URL
    pub fn token_endpoint(&self) -> String {
        format!("{}/api/token", self.accounts_url.trim_end_matches('/'))
    }

    /// Absolute URL for a Web API path such as `me/player/currently-playing`
    pub fn api_endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Build authorization URL with state.
    ///
    /// `force_dialog` asks the provider to show the consent screen again even
    /// if the user already approved the app, so a different account can be
    /// picked.
    pub fn build_auth_url(&self, state: &str, force_dialog: bool) -> String {
        let scopes = self.scopes.join(" ");
        let mut url = format!(
            "{}?response_type=code&client_id={}&scope={}&redirect_uri={}&state={}",
            self.authorize_endpoint(),
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&scopes),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(state)
        );

        if force_dialog {
            url.push_str("&show_dialog=true");
        }

        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            accounts_url: "https://accounts.example.com/".to_string(),
            api_url: "https://api.example.com/v1".to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            redirect_uri: "http://localhost:3000/api/callback".to_string(),
        }
    }

    #[test]
    fn test_endpoints() {
        let config = config();
        assert_eq!(config.authorize_endpoint(), "https://accounts.example.com/authorize");
        assert_eq!(config.token_endpoint(), "https://accounts.example.com/api/token");
        assert_eq!(
            config.api_endpoint("/me/player/currently-playing"),
            "https://api.example.com/v1/me/player/currently-playing"
        );
    }

    #[test]
    fn test_build_auth_url() {
        let url = config().build_auth_url("random_state", false);

        assert!(url.starts_with("https://accounts.example.com/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fapi%2Fcallback"
        ));
        // URL encoding converts spaces to %20
        assert!(url.contains("scope=user-read-recently-played%20user-read-currently-playing"));
        assert!(url.contains("state=random_state"));
        assert!(!url.contains("show_dialog"));
    }

    #[test]
    fn test_build_auth_url_forces_dialog() {
        let url = config().build_auth_url("s", true);
        assert!(url.ends_with("&show_dialog=true"));
    }

    #[test]
    fn test_debug_hides_client_secret() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("test_secret"));
    }
}
