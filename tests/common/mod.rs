// Shared fixtures for the HTTP integration tests
#![allow(dead_code)]

use axum::{body::Body, http::Request, response::Response, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use crm_gateway::api::{create_router, AppState};
use crm_gateway::config::OAuthSettings;
use crm_gateway::credentials::{CredentialVault, TokenCipher};
use crm_gateway::crm::{CrmClient, OpportunityService, ValidationRules};
use crm_gateway::oauth::{InMemoryStateStore, OAuthFlow, ProviderConfig, TokenClient};
use crm_gateway::session::SessionMaterializer;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const SUBJECT_ID: &str = "005xx000001Sv6A";
pub const ORG_ID: &str = "00Dxx0000001gPL";

pub struct TestGateway {
    pub app: Router,
    pub vault: Arc<CredentialVault>,
}

/// Gateway whose token endpoint lives at `login_url`
pub fn create_test_gateway(login_url: &str) -> TestGateway {
    let settings = OAuthSettings {
        client_id: "3MVG9test".to_string(),
        client_secret: "test-secret".to_string(),
        login_url: login_url.to_string(),
        ..OAuthSettings::default()
    };
    let tokens = Arc::new(
        TokenClient::new(ProviderConfig::from_settings(&settings), Duration::from_secs(5)).unwrap(),
    );

    let key = BASE64.encode([7u8; 32]);
    let vault = Arc::new(
        CredentialVault::new(":memory:", TokenCipher::from_base64_key(&key).unwrap()).unwrap(),
    );

    let crm = Arc::new(CrmClient::new("v59.0", Duration::from_secs(5)).unwrap());

    let state = AppState {
        oauth: Arc::new(OAuthFlow::new(
            Arc::clone(&tokens),
            Arc::new(InMemoryStateStore::new(600)),
            Arc::clone(&vault),
        )),
        vault: Arc::clone(&vault),
        materializer: Arc::new(SessionMaterializer::new(Arc::clone(&vault), tokens)),
        opportunities: Arc::new(OpportunityService::new(crm, ValidationRules::default())),
    };

    TestGateway {
        app: create_router(state),
        vault,
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
