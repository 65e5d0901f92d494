use crate::credentials::validate_key;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthSettings,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub crm: CrmConfig,
}

/// HTTP listener and exchange-state settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// How long an authorization round trip may take (seconds)
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
    /// How often expired exchange states are swept (seconds)
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_state_expiry() -> i64 {
    600
}

fn default_state_cleanup_interval() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            state_expiry_seconds: default_state_expiry(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
        }
    }
}

/// Connected App settings for the Salesforce authorization server
#[derive(Clone, Deserialize)]
pub struct OAuthSettings {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Login host, e.g. `https://login.salesforce.com` or `https://test.salesforce.com`
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_redirect_uri() -> String {
    "http://localhost:8000/auth/callback".to_string()
}

fn default_login_url() -> String {
    "https://login.salesforce.com".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["api".to_string(), "refresh_token".to_string()]
}

fn default_http_timeout() -> u64 {
    10
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            login_url: default_login_url(),
            scopes: default_scopes(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

impl OAuthSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("login_url", &self.login_url)
            .field("scopes", &self.scopes)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .finish()
    }
}

/// Credential vault settings
#[derive(Clone, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Base64-encoded 32-byte AES key
    #[serde(default)]
    pub encryption_key: String,
}

fn default_database_path() -> String {
    "credentials.db".to_string()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            encryption_key: String::new(),
        }
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("database_path", &self.database_path)
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

/// Salesforce REST API settings
#[derive(Debug, Clone, Deserialize)]
pub struct CrmConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    /// Close dates older than this many days make an opportunity ineligible
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,
}

fn default_api_version() -> String {
    "v59.0".to_string()
}

fn default_stale_after_days() -> i64 {
    180
}

/// Upper bound on `stale_after_days` (about a century)
pub const MAX_STALE_AFTER_DAYS: i64 = 36_500;

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            http_timeout_seconds: default_http_timeout(),
            stale_after_days: default_stale_after_days(),
        }
    }
}

impl CrmConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

impl GatewayConfig {
    /// Overlays environment variables on top of file/default values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SALESFORCE_CLIENT_ID") {
            self.oauth.client_id = v;
        }
        if let Some(v) = lookup("SALESFORCE_CLIENT_SECRET") {
            self.oauth.client_secret = v;
        }
        if let Some(v) = lookup("SALESFORCE_REDIRECT_URI") {
            self.oauth.redirect_uri = v;
        }
        if let Some(v) = lookup("SALESFORCE_DOMAIN") {
            self.oauth.login_url = format!("https://{}", v.trim_end_matches('/'));
        }
        if let Some(v) = lookup("ENCRYPTION_KEY") {
            self.vault.encryption_key = v;
        }
        if let Some(v) = lookup("CRM_GATEWAY_DB_PATH") {
            self.vault.database_path = v;
        }
        if let Some(v) = lookup("CRM_GATEWAY_BIND_ADDR") {
            self.server.bind_addr = v;
        }
    }

    /// Rejects configurations the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.oauth.client_id.is_empty() {
            return Err(anyhow!("oauth.client_id is required (SALESFORCE_CLIENT_ID)"));
        }
        if self.oauth.client_secret.is_empty() {
            return Err(anyhow!(
                "oauth.client_secret is required (SALESFORCE_CLIENT_SECRET)"
            ));
        }
        if !self.oauth.scopes.iter().any(|s| s == "refresh_token" || s == "offline_access") {
            return Err(anyhow!(
                "oauth.scopes must include refresh_token or offline_access"
            ));
        }
        validate_key(&self.vault.encryption_key)
            .context("vault.encryption_key (ENCRYPTION_KEY) must be a base64-encoded 32-byte key")?;
        if !(1..=MAX_STALE_AFTER_DAYS).contains(&self.crm.stale_after_days) {
            return Err(anyhow!(
                "crm.stale_after_days must be between 1 and {}",
                MAX_STALE_AFTER_DAYS
            ));
        }
        if self.oauth.http_timeout_seconds == 0 || self.crm.http_timeout_seconds == 0 {
            return Err(anyhow!("HTTP timeouts must be at least one second"));
        }
        if self.server.state_expiry_seconds <= 0 {
            return Err(anyhow!("server.state_expiry_seconds must be positive"));
        }
        if self.server.state_cleanup_interval_seconds == 0 {
            return Err(anyhow!("server.state_cleanup_interval_seconds must be positive"));
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<GatewayConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: GatewayConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use std::collections::HashMap;

    fn valid_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.oauth.client_id = "3MVG9client".to_string();
        config.oauth.client_secret = "secret".to_string();
        config.vault.encryption_key = BASE64.encode([0u8; 32]);
        config
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.server.state_expiry_seconds, 600);
        assert_eq!(config.oauth.login_url, "https://login.salesforce.com");
        assert_eq!(config.oauth.scopes, vec!["api", "refresh_token"]);
        assert_eq!(config.vault.database_path, "credentials.db");
        assert_eq!(config.crm.api_version, "v59.0");
        assert_eq!(config.crm.stale_after_days, 180);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:9000"
            state_expiry_seconds = 120

            [oauth]
            client_id = "3MVG9abc"
            client_secret = "s3cret"
            redirect_uri = "https://gateway.example.com/auth/callback"
            login_url = "https://test.salesforce.com"

            [vault]
            database_path = "/var/lib/gateway/vault.db"

            [crm]
            api_version = "v60.0"
            stale_after_days = 90
        "#;

        let config: GatewayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.server.state_expiry_seconds, 120);
        assert_eq!(config.server.state_cleanup_interval_seconds, 60);
        assert_eq!(config.oauth.client_id, "3MVG9abc");
        assert_eq!(config.oauth.login_url, "https://test.salesforce.com");
        assert_eq!(config.oauth.scopes, vec!["api", "refresh_token"]);
        assert_eq!(config.vault.database_path, "/var/lib/gateway/vault.db");
        assert_eq!(config.crm.api_version, "v60.0");
        assert_eq!(config.crm.stale_after_days, 90);
        assert_eq!(config.crm.http_timeout_seconds, 10);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SALESFORCE_CLIENT_ID", "env-client"),
            ("SALESFORCE_DOMAIN", "test.salesforce.com"),
            ("CRM_GATEWAY_DB_PATH", "/tmp/vault.db"),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.oauth.client_id, "env-client");
        assert_eq!(config.oauth.login_url, "https://test.salesforce.com");
        assert_eq!(config.vault.database_path, "/tmp/vault.db");
        // Untouched values keep their defaults
        assert_eq!(config.server.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_validate() {
        assert!(valid_config().validate().is_ok());

        let mut missing_secret = valid_config();
        missing_secret.oauth.client_secret.clear();
        assert!(missing_secret.validate().is_err());

        let mut bad_key = valid_config();
        bad_key.vault.encryption_key = BASE64.encode([0u8; 16]);
        assert!(bad_key.validate().is_err());

        let mut no_offline_scope = valid_config();
        no_offline_scope.oauth.scopes = vec!["api".to_string()];
        assert!(no_offline_scope.validate().is_err());

        let mut zero_window = valid_config();
        zero_window.crm.stale_after_days = 0;
        assert!(zero_window.validate().is_err());

        let mut huge_window = valid_config();
        huge_window.crm.stale_after_days = 100_000_000;
        assert!(huge_window.validate().is_err());

        let mut widest_window = valid_config();
        widest_window.crm.stale_after_days = MAX_STALE_AFTER_DAYS;
        assert!(widest_window.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", valid_config());
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }
}
