//! Error taxonomy shared by every layer of the gateway.
//!
//! Each variant maps to a stable `kind()` tag so callers (and the HTTP
//! boundary) can tell recoverable-by-caller conditions apart from internal
//! faults without inspecting message text.

use thiserror::Error;

/// Entry point a caller is sent to when it must (re)authorize.
pub const AUTHORIZE_PATH: &str = "/auth/login";

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Callback state has no stored verifier (expired, replayed or forged)
    #[error("Invalid state or session expired")]
    InvalidState,

    /// Token endpoint refused the authorization code / verifier pair
    #[error("Salesforce rejected the authorization code: {0}")]
    UpstreamRejected(String),

    /// Token endpoint refused the gateway's own client id or secret
    #[error("Salesforce rejected the gateway client credentials: {0}")]
    ClientRejected(String),

    /// Identity reference did not yield a subject id
    #[error("Could not extract user ID from identity reference '{0}'")]
    MalformedIdentity(String),

    /// No vault record for the subject
    #[error("Not connected to Salesforce")]
    NotConnected,

    /// Stored refresh credential was rejected (revoked or expired)
    #[error("Salesforce connection expired: {0}")]
    SessionExpired(String),

    /// Authorization server unreachable, timed out or answered 5xx
    #[error("Salesforce authorization server unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Access token presented to the CRM API was rejected mid-call
    #[error("Salesforce rejected the access token: {0}")]
    RemoteAuthExpired(String),

    #[error("Salesforce API unavailable: {0}")]
    RemoteUnavailable(String),

    /// CRM API refused the query itself (non-auth 4xx)
    #[error("Salesforce rejected the query: {0}")]
    RemoteQueryFailed(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Sealing or opening a stored credential failed; never treated as absent
    #[error("Credential encryption failure: {0}")]
    EncryptionFailure(String),

    /// Remote authorization succeeded but the vault commit did not
    #[error("Authorization succeeded but the credential could not be stored: {0}")]
    VaultWriteFailed(String),

    #[error("Credential store error: {0}")]
    Storage(String),

    /// Caller-supplied bearer token or instance URL missing or malformed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl GatewayError {
    /// Stable machine-readable tag for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidState => "invalid_state",
            GatewayError::UpstreamRejected(_) => "upstream_rejected",
            GatewayError::ClientRejected(_) => "client_rejected",
            GatewayError::MalformedIdentity(_) => "malformed_identity",
            GatewayError::NotConnected => "not_connected",
            GatewayError::SessionExpired(_) => "session_expired",
            GatewayError::UpstreamUnavailable(_) => "upstream_unavailable",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::RemoteAuthExpired(_) => "remote_auth_expired",
            GatewayError::RemoteUnavailable(_) => "remote_unavailable",
            GatewayError::RemoteQueryFailed(_) => "remote_query_failed",
            GatewayError::InvalidFilter(_) => "invalid_filter",
            GatewayError::EncryptionFailure(_) => "encryption_failure",
            GatewayError::VaultWriteFailed(_) => "vault_write_failed",
            GatewayError::Storage(_) => "storage",
            GatewayError::Unauthorized(_) => "unauthorized",
        }
    }

    /// Where the caller should go to recover, for errors fixed by authorizing again.
    pub fn reauthorize_hint(&self) -> Option<&'static str> {
        match self {
            GatewayError::NotConnected
            | GatewayError::SessionExpired(_)
            | GatewayError::RemoteAuthExpired(_) => Some(AUTHORIZE_PATH),
            _ => None,
        }
    }

    /// True for transient remote failures the caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::UpstreamUnavailable(_) | GatewayError::RemoteUnavailable(_)
        )
    }
}
