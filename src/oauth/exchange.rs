//! Token endpoint client.
//!
//! Redeems authorization codes and refresh tokens against the Salesforce
//! token endpoint, and classifies failures so callers can tell a rejected
//! credential from an unreachable server.

use super::provider::ProviderConfig;
use crate::error::{GatewayError, Result};
use anyhow::Context;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Token endpoint success body (code and refresh grants)
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    instance_url: Option<String>,
    /// Identity URL: `https://login.salesforce.com/id/{orgId}/{userId}`
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

/// `error` codes meaning the client id or secret is wrong, not the user's grant
const CLIENT_ERROR_CODES: &[&str] = &[
    "invalid_client_id",
    "invalid_client",
    "invalid_client_credentials",
    "unauthorized_client",
];

/// Token endpoint error body
#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Result of redeeming an authorization code
pub struct CodeGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub instance_url: String,
    pub identity_url: String,
}

impl fmt::Debug for CodeGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeGrant")
            .field("instance_url", &self.instance_url)
            .field("identity_url", &self.identity_url)
            .finish_non_exhaustive()
    }
}

/// Result of a refresh grant
pub struct RefreshGrant {
    pub access_token: String,
    pub instance_url: Option<String>,
    /// Present only when the server rotated the refresh token
    pub rotated_refresh_token: Option<String>,
}

impl fmt::Debug for RefreshGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshGrant")
            .field("instance_url", &self.instance_url)
            .field("rotated", &self.rotated_refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

/// HTTP client for the provider's token endpoint
pub struct TokenClient {
    http_client: reqwest::Client,
    provider: ProviderConfig,
}

impl TokenClient {
    /// Every request carries `timeout`; expiry is reported as unavailability.
    pub fn new(provider: ProviderConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build token endpoint HTTP client")?;
        Ok(Self {
            http_client,
            provider,
        })
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> reqwest::Result<reqwest::Response> {
        self.http_client
            .post(&self.provider.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
    }

    /// Exchange an authorization code (plus its PKCE verifier) for tokens.
    ///
    /// # Errors
    /// * `UpstreamRejected` - 4xx from the token endpoint, or no refresh token granted
    /// * `ClientRejected` - the gateway's client id or secret was refused
    /// * `UpstreamUnavailable` - network failure, timeout, 429 or 5xx
    pub async fn redeem_code(&self, code: &str, verifier: &str) -> Result<CodeGrant> {
        debug!(token_url = %self.provider.token_url, "Exchanging authorization code");

        let response = self
            .post_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.provider.client_id),
                ("client_secret", &self.provider.client_secret),
                ("redirect_uri", &self.provider.redirect_uri),
                ("code_verifier", verifier),
            ])
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(describe_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let rejection = read_rejection(status, response).await;
            return Err(if rejection.is_client_error() {
                GatewayError::ClientRejected(rejection.detail)
            } else if is_credential_rejection(status) {
                GatewayError::UpstreamRejected(rejection.detail)
            } else {
                GatewayError::UpstreamUnavailable(rejection.detail)
            });
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            GatewayError::UpstreamUnavailable(format!("unparsable token response: {}", e))
        })?;

        debug!(
            has_refresh_token = token_response.refresh_token.is_some(),
            token_type = ?token_response.token_type,
            "Code exchange successful"
        );

        let refresh_token = token_response.refresh_token.ok_or_else(|| {
            GatewayError::UpstreamRejected(
                "token response did not include a refresh token (is the refresh_token scope granted?)"
                    .to_string(),
            )
        })?;
        let instance_url = token_response.instance_url.ok_or_else(|| {
            GatewayError::UpstreamRejected("token response did not include instance_url".to_string())
        })?;

        Ok(CodeGrant {
            access_token: token_response.access_token,
            refresh_token,
            instance_url,
            identity_url: token_response.id.unwrap_or_default(),
        })
    }

    /// Mint a fresh access token from a stored refresh token.
    ///
    /// # Errors
    /// * `SessionExpired` - 400/401/403, e.g. `invalid_grant` for a revoked token
    /// * `ClientRejected` - the gateway's client id or secret was refused
    /// * `UpstreamUnavailable` - network failure, timeout, 429, 5xx or an unparsable body
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant> {
        let response = self
            .post_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.provider.client_id),
                ("client_secret", &self.provider.client_secret),
            ])
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(describe_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let rejection = read_rejection(status, response).await;
            return Err(if rejection.is_client_error() {
                GatewayError::ClientRejected(rejection.detail)
            } else if is_credential_rejection(status) {
                GatewayError::SessionExpired(rejection.detail)
            } else {
                GatewayError::UpstreamUnavailable(rejection.detail)
            });
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            GatewayError::UpstreamUnavailable(format!("unparsable token response: {}", e))
        })?;

        Ok(RefreshGrant {
            access_token: token_response.access_token,
            instance_url: token_response.instance_url,
            rotated_refresh_token: token_response.refresh_token,
        })
    }
}

/// 4xx other than 429 means the server looked at the credential and said no
fn is_credential_rejection(status: StatusCode) -> bool {
    status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "token endpoint request timed out".to_string()
    } else if e.is_connect() {
        format!("could not connect to token endpoint: {}", e)
    } else {
        format!("token endpoint request failed: {}", e)
    }
}

/// Non-success token endpoint answer
struct Rejection {
    /// OAuth `error` code, when the body carried one
    code: Option<String>,
    detail: String,
}

impl Rejection {
    fn is_client_error(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| CLIENT_ERROR_CODES.contains(&code))
    }
}

async fn read_rejection(status: StatusCode, response: reqwest::Response) -> Rejection {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());

    match serde_json::from_str::<TokenErrorResponse>(&body) {
        Ok(err) => {
            let detail = match err.error_description {
                Some(description) => format!("status {}: {} ({})", status, err.error, description),
                None => format!("status {}: {}", status, err.error),
            };
            Rejection {
                code: Some(err.error),
                detail,
            }
        }
        Err(_) => Rejection {
            code: None,
            detail: format!("status {}: {}", status, body),
        },
    }
}

/// Split an identity URL into `(org_id, subject_id)`.
///
/// The last two path segments are `{orgId}/{userId}`. An empty user id is
/// `MalformedIdentity`.
pub fn parse_identity(identity_url: &str) -> Result<(String, String)> {
    let mut segments = identity_url.trim().rsplit('/');
    let subject_id = segments.next().unwrap_or_default();
    let org_id = segments.next().unwrap_or_default();

    if subject_id.is_empty() {
        return Err(GatewayError::MalformedIdentity(identity_url.to_string()));
    }

    Ok((org_id.to_string(), subject_id.to_string()))
}
