//! Ephemeral Salesforce sessions.
//!
//! A [`Session`] is an access token plus the instance it is valid for. It
//! lives for one request and is never stored or logged. Sessions come from
//! either the caller's own headers or [`SessionMaterializer::resolve`], which
//! turns a vaulted refresh token into a fresh access token.

use crate::auth::{extract_bearer_token, extract_instance_url};
use crate::credentials::CredentialVault;
use crate::error::{GatewayError, Result};
use crate::oauth::TokenClient;
use axum::http::HeaderMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Access token and instance URL for one request
#[derive(Clone)]
pub struct Session {
    access_token: String,
    instance_url: String,
}

impl Session {
    pub fn new(access_token: impl Into<String>, instance_url: &str) -> Self {
        Self {
            access_token: access_token.into(),
            instance_url: instance_url.trim_end_matches('/').to_string(),
        }
    }

    /// Session supplied directly by the caller via `Authorization: Bearer`
    /// and `X-Sfdc-Instance-Url`.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let access_token =
            extract_bearer_token(headers).map_err(|e| GatewayError::Unauthorized(e.to_string()))?;
        let instance_url =
            extract_instance_url(headers).map_err(|e| GatewayError::Unauthorized(e.to_string()))?;

        Ok(Self::new(access_token, &instance_url))
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("instance_url", &self.instance_url)
            .finish()
    }
}

/// Resolves a subject id into a freshly minted [`Session`].
pub struct SessionMaterializer {
    vault: Arc<CredentialVault>,
    tokens: Arc<TokenClient>,
}

impl SessionMaterializer {
    pub fn new(vault: Arc<CredentialVault>, tokens: Arc<TokenClient>) -> Self {
        Self { vault, tokens }
    }

    /// Open the subject's refresh token and run a refresh grant.
    ///
    /// The vault record is never modified here: a rejected refresh leaves it
    /// in place for the user to re-authorize over, and a rotated refresh
    /// token is not written back.
    ///
    /// # Errors
    /// * `NotConnected` - no vault record
    /// * `EncryptionFailure` - the stored token could not be opened
    /// * `SessionExpired` - Salesforce rejected the refresh token
    /// * `UpstreamUnavailable` - token endpoint unreachable, timed out or 5xx
    pub async fn resolve(&self, subject_id: &str) -> Result<Session> {
        let record = self.vault.get(subject_id)?;
        let refresh_token = self.vault.reveal_refresh_token(&record)?;

        let grant = match self.tokens.refresh(&refresh_token).await {
            Ok(grant) => grant,
            Err(e @ GatewayError::SessionExpired(_)) => {
                info!(subject_id = %subject_id, error = %e, "Stored refresh token rejected");
                return Err(e);
            }
            Err(e) => {
                warn!(subject_id = %subject_id, error = %e, "Refresh grant failed");
                return Err(e);
            }
        };

        if grant.rotated_refresh_token.is_some() {
            debug!(subject_id = %subject_id, "Refresh token rotated by Salesforce; keeping stored token");
        }

        Ok(Session::new(grant.access_token, &record.instance_url))
    }
}
