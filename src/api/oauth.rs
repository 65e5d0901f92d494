//! Authorization routes: login redirect, callback, connection status and
//! disconnect.

use super::AppState;
use crate::error::{GatewayError, Result};
use axum::{
    extract::{Path, Query, State},
    response::{Json, Redirect},
    routing::{delete, get},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Authorization callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectedResponse {
    success: bool,
    message: String,
    sf_user_id: String,
    salesforce_org_id: String,
    instance_url: String,
    connected_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct ConnectionStatus {
    connected: bool,
    sf_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    connected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    salesforce_org_id: Option<String>,
}

#[derive(Serialize)]
pub struct DisconnectResponse {
    success: bool,
    message: String,
}

pub fn create_oauth_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/status/:subject_id", get(status))
        .route("/auth/disconnect/:subject_id", delete(disconnect))
        .with_state(state)
}

/// GET /auth/login
///
/// Redirects to the Salesforce authorization page with a fresh PKCE
/// challenge and single-use state.
async fn login(State(state): State<AppState>) -> Result<Redirect> {
    let request = state.oauth.create_challenge().await?;

    info!("Redirecting to Salesforce authorization");

    Ok(Redirect::temporary(&request.authorization_url))
}

/// GET /auth/callback
///
/// Redeems the authorization code and stores the sealed refresh token.
async fn callback(
    State(state): State<AppState>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Json<ConnectedResponse>> {
    debug!("Authorization callback received");

    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "Salesforce authorization denied");
        return Err(GatewayError::UpstreamRejected(format!(
            "{} - {}",
            error, description
        )));
    }

    let oauth_state = callback.state.ok_or(GatewayError::InvalidState)?;
    let code = callback.code.ok_or_else(|| {
        GatewayError::UpstreamRejected("callback did not include an authorization code".to_string())
    })?;

    let account = state.oauth.exchange(&code, &oauth_state).await?;

    Ok(Json(ConnectedResponse {
        success: true,
        message: "Successfully connected to Salesforce".to_string(),
        sf_user_id: account.subject_id,
        salesforce_org_id: account.org_id,
        instance_url: account.instance_url,
        connected_at: account.connected_at,
    }))
}

/// GET /auth/status/:subject_id
async fn status(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<ConnectionStatus>> {
    match state.vault.get(&subject_id) {
        Ok(record) => Ok(Json(ConnectionStatus {
            connected: true,
            sf_user_id: record.subject_id,
            instance_url: Some(record.instance_url),
            connected_at: Some(record.connected_at),
            salesforce_org_id: Some(record.org_id),
        })),
        Err(GatewayError::NotConnected) => Ok(Json(ConnectionStatus {
            connected: false,
            sf_user_id: subject_id,
            instance_url: None,
            connected_at: None,
            salesforce_org_id: None,
        })),
        Err(e) => Err(e),
    }
}

/// DELETE /auth/disconnect/:subject_id
async fn disconnect(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<DisconnectResponse>> {
    state.vault.delete(&subject_id).map_err(|e| match e {
        GatewayError::NotConnected => GatewayError::NotFound("Salesforce connection".to_string()),
        e => e,
    })?;

    info!(subject_id = %subject_id, "Salesforce account disconnected");

    Ok(Json(DisconnectResponse {
        success: true,
        message: "Successfully disconnected from Salesforce".to_string(),
    }))
}
