//! Salesforce authorization server endpoints and Connected App identity.

use super::pkce::CHALLENGE_METHOD;
use crate::config::OAuthSettings;
use std::fmt;

const AUTHORIZE_PATH: &str = "/services/oauth2/authorize";
const TOKEN_PATH: &str = "/services/oauth2/token";

/// OAuth provider configuration
#[derive(Clone)]
pub struct ProviderConfig {
    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// OAuth token endpoint URL (code and refresh grants)
    pub token_url: String,

    /// Requested scopes; must include an offline scope
    pub scopes: Vec<String>,

    pub client_id: String,

    pub client_secret: String,

    /// Callback registered on the Connected App
    pub redirect_uri: String,
}

impl ProviderConfig {
    pub fn from_settings(settings: &OAuthSettings) -> Self {
        let login_url = settings.login_url.trim_end_matches('/');
        Self {
            auth_url: format!("{}{}", login_url, AUTHORIZE_PATH),
            token_url: format!("{}{}", login_url, TOKEN_PATH),
            scopes: settings.scopes.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            redirect_uri: settings.redirect_uri.clone(),
        }
    }

    /// Build the authorization redirect for one PKCE round trip
    pub fn build_auth_url(&self, state: &str, code_challenge: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
            CHALLENGE_METHOD,
        )
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> OAuthSettings {
        OAuthSettings {
            client_id: "3MVG9test_client".to_string(),
            client_secret: "test_secret".to_string(),
            redirect_uri: "http://localhost:8000/auth/callback".to_string(),
            login_url: "https://test.salesforce.com/".to_string(),
            ..OAuthSettings::default()
        }
    }

    #[test]
    fn test_endpoints_from_login_url() {
        let config = ProviderConfig::from_settings(&test_settings());

        assert_eq!(
            config.auth_url,
            "https://test.salesforce.com/services/oauth2/authorize"
        );
        assert_eq!(
            config.token_url,
            "https://test.salesforce.com/services/oauth2/token"
        );
    }

    #[test]
    fn test_build_auth_url() {
        let config = ProviderConfig::from_settings(&test_settings());

        let url = config.build_auth_url("random_state", "challenge-abc_123");

        assert!(url.starts_with("https://test.salesforce.com/services/oauth2/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=3MVG9test_client"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8000%2Fauth%2Fcallback"));
        assert!(url.contains("scope=api%20refresh_token"));
        assert!(url.contains("state=random_state"));
        assert!(url.contains("code_challenge=challenge-abc_123"));
        assert!(url.contains("code_challenge_method=S256"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", ProviderConfig::from_settings(&test_settings()));
        assert!(!rendered.contains("test_secret"));
    }
}
