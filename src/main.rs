use anyhow::{Context, Result};
use crm_gateway::api::{create_router, AppState};
use crm_gateway::config::{load_config, GatewayConfig};
use crm_gateway::credentials::{CredentialVault, TokenCipher};
use crm_gateway::crm::{CrmClient, OpportunityService, ValidationRules};
use crm_gateway::oauth::{
    run_state_cleanup, InMemoryStateStore, OAuthFlow, ProviderConfig, TokenClient,
};
use crm_gateway::session::SessionMaterializer;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crm_gateway=info".into()),
        )
        .init();

    info!("CRM gateway starting...");

    let mut config = match std::env::var("CRM_GATEWAY_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => GatewayConfig::default(),
    };
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;

    info!(
        bind_addr = %config.server.bind_addr,
        login_url = %config.oauth.login_url,
        database_path = %config.vault.database_path,
        api_version = %config.crm.api_version,
        "Configuration loaded"
    );

    let cipher = TokenCipher::from_base64_key(&config.vault.encryption_key)?;
    let vault = Arc::new(
        CredentialVault::new(&config.vault.database_path, cipher)
            .context("Failed to initialize credential vault")?,
    );
    let stats = vault.stats(chrono::Utc::now())?;
    info!(
        connected = stats.total,
        connected_last_week = stats.connected_last_week,
        connected_last_month = stats.connected_last_month,
        "Credential vault initialized"
    );

    let tokens = Arc::new(TokenClient::new(
        ProviderConfig::from_settings(&config.oauth),
        config.oauth.http_timeout(),
    )?);

    let state_store = InMemoryStateStore::new(config.server.state_expiry_seconds);
    tokio::spawn(run_state_cleanup(
        state_store.clone(),
        config.server.state_cleanup_interval_seconds,
    ));

    let crm_client = Arc::new(CrmClient::new(
        &config.crm.api_version,
        config.crm.http_timeout(),
    )?);

    let state = AppState {
        oauth: Arc::new(OAuthFlow::new(
            Arc::clone(&tokens),
            Arc::new(state_store),
            Arc::clone(&vault),
        )),
        vault: Arc::clone(&vault),
        materializer: Arc::new(SessionMaterializer::new(Arc::clone(&vault), tokens)),
        opportunities: Arc::new(OpportunityService::new(
            crm_client,
            ValidationRules::new(config.crm.stale_after_days),
        )),
    };

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(bind_addr = %config.server.bind_addr, "CRM gateway listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("CRM gateway stopped");

    Ok(())
}
