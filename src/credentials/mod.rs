//! Encrypted-at-rest vault for Salesforce refresh tokens.
//!
//! One record per subject (the Salesforce user id). Refresh tokens are sealed
//! with AES-256-GCM before they touch SQLite and are only opened inside the
//! session materializer, for the length of a single refresh grant.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialVault                    │
//! │  - upsert / get / delete per subject     │
//! │  - housekeeping (purge, stats)           │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!       (seal)               (open)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       TokenCipher                        │
//! │  - AES-256-GCM, key injected once        │
//! │  - Unique nonce per seal                 │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite (sf_tokens)                 │
//! │  - UNIQUE(subject_id)                    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use crm_gateway::credentials::{CredentialVault, TokenCipher};
//!
//! # fn main() -> anyhow::Result<()> {
//! let key = std::env::var("ENCRYPTION_KEY")?;
//! let vault = CredentialVault::new("credentials.db", TokenCipher::from_base64_key(&key)?)?;
//!
//! vault.upsert("005xx0000012345", "refresh-token", "https://acme.my.salesforce.com", "00Dxx0000001")?;
//! let record = vault.get("005xx0000012345")?;
//! println!("connected at {}", record.connected_at);
//!
//! vault.delete("005xx0000012345")?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

mod encryption;
mod storage;

pub use encryption::{validate_key, SealedToken, TokenCipher};
pub use storage::CredentialVault;

/// A subject's stored connection. The refresh token stays sealed.
#[derive(Clone, Debug, PartialEq)]
pub struct CredentialRecord {
    /// Salesforce user id (natural key)
    pub subject_id: String,

    pub encrypted_refresh_token: SealedToken,

    /// Base URL of the subject's Salesforce instance
    pub instance_url: String,

    pub org_id: String,

    /// When the subject last completed authorization (UTC)
    pub connected_at: DateTime<Utc>,
}

/// Connection counts for housekeeping dashboards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VaultStats {
    pub total: u64,
    pub connected_last_week: u64,
    pub connected_last_month: u64,
}
