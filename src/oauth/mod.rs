//! OAuth 2.0 authorization code flow with PKCE against Salesforce.
//!
//! 1. Caller hits GET /auth/login → `create_challenge` registers
//!    `state → verifier` and returns the authorization URL
//! 2. User authorizes on Salesforce
//! 3. Salesforce redirects to /auth/callback?code&state
//! 4. `exchange` takes the verifier (single use), redeems the code, parses the
//!    identity URL and upserts the sealed refresh token into the vault
//!
//! The vault write is the only commit point of the flow.

pub mod exchange;
pub mod pkce;
pub mod provider;
pub mod state_manager;

pub use exchange::{parse_identity, CodeGrant, RefreshGrant, TokenClient};
pub use pkce::PkceChallenge;
pub use provider::ProviderConfig;
pub use state_manager::{run_state_cleanup, ExchangeStateStore, InMemoryStateStore};

use crate::credentials::CredentialVault;
use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where to send the user, plus the correlation state embedded in it
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub authorization_url: String,
    pub state: String,
}

/// Outcome of a completed authorization. No secrets.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedAccount {
    pub subject_id: String,
    pub org_id: String,
    pub instance_url: String,
    pub connected_at: DateTime<Utc>,
}

/// Authorization-initiation and code-redemption steps, wired to their
/// collaborators at construction.
pub struct OAuthFlow {
    tokens: Arc<TokenClient>,
    states: Arc<dyn ExchangeStateStore>,
    vault: Arc<CredentialVault>,
}

impl OAuthFlow {
    pub fn new(
        tokens: Arc<TokenClient>,
        states: Arc<dyn ExchangeStateStore>,
        vault: Arc<CredentialVault>,
    ) -> Self {
        Self {
            tokens,
            states,
            vault,
        }
    }

    /// Generate PKCE material, remember `state → verifier`, and build the
    /// authorization URL.
    pub async fn create_challenge(&self) -> Result<AuthorizationRequest> {
        let pkce = PkceChallenge::generate();
        let state = pkce::generate_state();

        self.states.put(&state, &pkce.verifier).await?;

        let authorization_url = self
            .tokens
            .provider()
            .build_auth_url(&state, &pkce.challenge);

        Ok(AuthorizationRequest {
            authorization_url,
            state,
        })
    }

    /// Redeem `code` for the round trip identified by `state`.
    ///
    /// # Errors
    /// * `InvalidState` - state unknown, expired or already used
    /// * `UpstreamRejected` / `UpstreamUnavailable` - token endpoint failure
    /// * `MalformedIdentity` - identity URL without a user id
    /// * `VaultWriteFailed` - Salesforce authorized the user but the vault
    ///   commit failed; authorization must be restarted from the beginning
    pub async fn exchange(&self, code: &str, state: &str) -> Result<ConnectedAccount> {
        let Some(verifier) = self.states.take(state).await? else {
            warn!("Authorization callback with unknown or expired state");
            return Err(GatewayError::InvalidState);
        };

        let grant = self.tokens.redeem_code(code, &verifier).await?;
        let (org_id, subject_id) = parse_identity(&grant.identity_url)?;

        let record = self
            .vault
            .upsert(&subject_id, &grant.refresh_token, &grant.instance_url, &org_id)
            .map_err(|e| {
                error!(subject_id = %subject_id, error = %e, "Vault write failed after successful authorization");
                GatewayError::VaultWriteFailed(e.to_string())
            })?;

        info!(
            subject_id = %record.subject_id,
            org_id = %record.org_id,
            instance_url = %record.instance_url,
            "Salesforce account connected"
        );

        Ok(ConnectedAccount {
            subject_id: record.subject_id,
            org_id: record.org_id,
            instance_url: record.instance_url,
            connected_at: record.connected_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthSettings;
    use crate::credentials::TokenCipher;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    const TOKEN_BODY: &str = r#"{
        "access_token": "00D!access",
        "refresh_token": "5Aep861-refresh",
        "instance_url": "https://acme.my.salesforce.com",
        "id": "https://login.salesforce.com/id/00Dxx0000001gPL/005xx000001Sv6A",
        "token_type": "Bearer"
    }"#;

    fn flow_for(login_url: &str) -> (OAuthFlow, Arc<CredentialVault>) {
        let settings = OAuthSettings {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            login_url: login_url.to_string(),
            ..OAuthSettings::default()
        };
        let tokens = TokenClient::new(
            ProviderConfig::from_settings(&settings),
            Duration::from_secs(5),
        )
        .unwrap();
        let vault = Arc::new(
            CredentialVault::new(":memory:", TokenCipher::new(&[9u8; 32]).unwrap()).unwrap(),
        );
        let flow = OAuthFlow::new(
            Arc::new(tokens),
            Arc::new(InMemoryStateStore::new(600)),
            vault.clone(),
        );
        (flow, vault)
    }

    fn query_param(url: &str, name: &str) -> String {
        let query = url.split_once('?').unwrap().1;
        serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .unwrap()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_challenge_embeds_state() {
        let (flow, _) = flow_for("https://login.salesforce.com");

        let request = flow.create_challenge().await.unwrap();

        assert_eq!(query_param(&request.authorization_url, "state"), request.state);
        assert_eq!(
            query_param(&request.authorization_url, "code_challenge_method"),
            "S256"
        );
    }

    #[tokio::test]
    async fn test_exchange_stores_credentials() {
        let mut server = Server::new_async().await;
        let (flow, vault) = flow_for(&server.url());

        let request = flow.create_challenge().await.unwrap();
        let challenge = query_param(&request.authorization_url, "code_challenge");

        let _mock = server
            .mock("POST", "/services/oauth2/token")
            .match_body(Matcher::UrlEncoded("code".into(), "aPrx".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TOKEN_BODY)
            .create_async()
            .await;

        let account = flow.exchange("aPrx", &request.state).await.unwrap();
        assert_eq!(account.subject_id, "005xx000001Sv6A");
        assert_eq!(account.org_id, "00Dxx0000001gPL");
        assert_eq!(account.instance_url, "https://acme.my.salesforce.com");
        assert_eq!(challenge.len(), 43);

        let record = vault.get("005xx000001Sv6A").unwrap();
        assert_eq!(
            vault.reveal_refresh_token(&record).unwrap(),
            "5Aep861-refresh"
        );
    }

    #[tokio::test]
    async fn test_exchange_replayed_state_is_invalid() {
        let mut server = Server::new_async().await;
        let (flow, _) = flow_for(&server.url());
        let request = flow.create_challenge().await.unwrap();

        let mock = server
            .mock("POST", "/services/oauth2/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TOKEN_BODY)
            .expect(1)
            .create_async()
            .await;

        flow.exchange("aPrx", &request.state).await.unwrap();
        let err = flow.exchange("aPrx", &request.state).await.unwrap_err();

        assert!(matches!(err, GatewayError::InvalidState));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_unknown_state_skips_token_endpoint() {
        let mut server = Server::new_async().await;
        let (flow, _) = flow_for(&server.url());

        let mock = server
            .mock("POST", "/services/oauth2/token")
            .expect(0)
            .create_async()
            .await;

        let err = flow.exchange("aPrx", "forged").await.unwrap_err();

        assert!(matches!(err, GatewayError::InvalidState));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_malformed_identity() {
        let mut server = Server::new_async().await;
        let (flow, vault) = flow_for(&server.url());
        let request = flow.create_challenge().await.unwrap();

        let _mock = server
            .mock("POST", "/services/oauth2/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token": "a", "refresh_token": "r",
                    "instance_url": "https://acme.my.salesforce.com",
                    "id": "https://login.salesforce.com/id/00Dxx0000001gPL/"}"#,
            )
            .create_async()
            .await;

        let err = flow.exchange("aPrx", &request.state).await.unwrap_err();

        assert!(matches!(err, GatewayError::MalformedIdentity(_)));
        assert_eq!(vault.stats(Utc::now()).unwrap().total, 0);
    }
}
