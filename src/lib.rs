// Error taxonomy
pub mod error;

// Configuration (TOML + environment)
pub mod config;

// Caller-supplied session headers
pub mod auth;

// Encrypted refresh-token vault
pub mod credentials;

// PKCE authorization code flow
pub mod oauth;

// Ephemeral sessions and the vault-backed materializer
pub mod session;

// Opportunity queries and validation
pub mod crm;

// HTTP boundary
pub mod api;
