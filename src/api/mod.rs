//! HTTP boundary (JSON only).
//!
//! Every handler returns `Result<_, GatewayError>`; the `IntoResponse` impl
//! below is the single place errors become status codes and
//! `{error, message, auth_url?}` bodies.

pub mod oauth;
pub mod opportunities;

pub use oauth::create_oauth_router;
pub use opportunities::create_opportunity_router;

use crate::credentials::CredentialVault;
use crate::crm::OpportunityService;
use crate::error::GatewayError;
use crate::oauth::OAuthFlow;
use crate::session::SessionMaterializer;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

/// Shared state for every router
#[derive(Clone)]
pub struct AppState {
    pub oauth: Arc<OAuthFlow>,
    pub vault: Arc<CredentialVault>,
    pub materializer: Arc<SessionMaterializer>,
    pub opportunities: Arc<OpportunityService>,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_url: Option<&'static str>,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidState
            | GatewayError::UpstreamRejected(_)
            | GatewayError::MalformedIdentity(_)
            | GatewayError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotConnected
            | GatewayError::SessionExpired(_)
            | GatewayError::RemoteAuthExpired(_)
            | GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::RemoteQueryFailed(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamUnavailable(_) | GatewayError::RemoteUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::ClientRejected(_)
            | GatewayError::EncryptionFailure(_)
            | GatewayError::VaultWriteFailed(_)
            | GatewayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            if self.is_retryable() {
                warn!(kind = self.kind(), error = %self, "Request failed on remote dependency");
            } else {
                error!(kind = self.kind(), error = %self, "Request failed");
            }
        }

        let body = Json(ErrorResponse {
            error: self.kind(),
            message: self.to_string(),
            auth_url: self.reauthorize_hint(),
        });

        (status, body).into_response()
    }
}

/// Full application router: health, OAuth and opportunity routes, permissive CORS
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(create_oauth_router(state.clone()))
        .merge(create_opportunity_router(state))
        .layer(CorsLayer::permissive())
}

/// GET /
async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}
