//! Credential vault backed by SQLite.
//!
//! Holds at most one sealed refresh token per subject. The unique constraint
//! on `subject_id` plus `ON CONFLICT ... DO UPDATE` gives atomic upserts;
//! deletes are single statements.

use super::encryption::{SealedToken, TokenCipher};
use super::{CredentialRecord, VaultStats};
use crate::error::{GatewayError, Result};
use anyhow::Context;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Encrypted refresh-token vault.
///
/// # Schema
/// ```sql
/// CREATE TABLE sf_tokens (
///     id INTEGER PRIMARY KEY,
///     subject_id TEXT NOT NULL UNIQUE,
///     refresh_token BLOB NOT NULL,        -- AES-256-GCM ciphertext
///     refresh_token_nonce BLOB NOT NULL,
///     instance_url TEXT NOT NULL,
///     org_id TEXT NOT NULL,
///     connected_at TEXT NOT NULL          -- RFC 3339, microsecond precision, UTC
/// );
/// ```
///
/// # Thread Safety
/// The connection sits behind a `Mutex`; no lock is ever held across an
/// `.await`, so callers on the async runtime only block for one statement.
pub struct CredentialVault {
    conn: Mutex<Connection>,
    cipher: TokenCipher,
}

impl CredentialVault {
    /// Opens (or creates) the vault at `db_path`.
    ///
    /// Use `":memory:"` for an ephemeral vault.
    pub fn new<P: AsRef<Path>>(db_path: P, cipher: TokenCipher) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sf_tokens (
                id INTEGER PRIMARY KEY,
                subject_id TEXT NOT NULL UNIQUE,
                refresh_token BLOB NOT NULL,
                refresh_token_nonce BLOB NOT NULL,
                instance_url TEXT NOT NULL,
                org_id TEXT NOT NULL,
                connected_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create sf_tokens table")?;

        // Cleanup queries filter on connection age
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sf_tokens_connected_at ON sf_tokens(connected_at)",
            [],
        )
        .context("Failed to create index")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GatewayError::Storage("credential store lock poisoned".to_string()))
    }

    /// Seals `refresh_token` and stores it for `subject_id`, replacing any
    /// previous record for that subject.
    pub fn upsert(
        &self,
        subject_id: &str,
        refresh_token: &str,
        instance_url: &str,
        org_id: &str,
    ) -> Result<CredentialRecord> {
        let sealed = self.cipher.seal(refresh_token)?;
        let connected_at = Utc::now();

        self.conn()?
            .execute(
                r#"
                INSERT INTO sf_tokens (
                    subject_id, refresh_token, refresh_token_nonce,
                    instance_url, org_id, connected_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(subject_id) DO UPDATE SET
                    refresh_token = excluded.refresh_token,
                    refresh_token_nonce = excluded.refresh_token_nonce,
                    instance_url = excluded.instance_url,
                    org_id = excluded.org_id,
                    connected_at = excluded.connected_at
                "#,
                params![
                    subject_id,
                    sealed.ciphertext,
                    sealed.nonce,
                    instance_url,
                    org_id,
                    timestamp(&connected_at),
                ],
            )
            .map_err(|e| GatewayError::Storage(format!("failed to store credentials: {}", e)))?;

        debug!(subject_id = %subject_id, "Stored sealed refresh token");

        Ok(CredentialRecord {
            subject_id: subject_id.to_string(),
            encrypted_refresh_token: sealed,
            instance_url: instance_url.to_string(),
            org_id: org_id.to_string(),
            connected_at: parse_timestamp(&timestamp(&connected_at))?,
        })
    }

    /// Reads the record for `subject_id`; `NotConnected` when there is none.
    ///
    /// The refresh token stays sealed.
    pub fn get(&self, subject_id: &str) -> Result<CredentialRecord> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT refresh_token, refresh_token_nonce, instance_url, org_id, connected_at
                FROM sf_tokens
                WHERE subject_id = ?1
                "#,
                params![subject_id],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| GatewayError::Storage(format!("failed to read credentials: {}", e)))?;

        let (ciphertext, nonce, instance_url, org_id, connected_at) =
            row.ok_or(GatewayError::NotConnected)?;

        Ok(CredentialRecord {
            subject_id: subject_id.to_string(),
            encrypted_refresh_token: SealedToken { ciphertext, nonce },
            instance_url,
            org_id,
            connected_at: parse_timestamp(&connected_at)?,
        })
    }

    /// Deletes the record for `subject_id`; `NotConnected` when there was none.
    pub fn delete(&self, subject_id: &str) -> Result<()> {
        let rows_affected = self
            .conn()?
            .execute(
                "DELETE FROM sf_tokens WHERE subject_id = ?1",
                params![subject_id],
            )
            .map_err(|e| GatewayError::Storage(format!("failed to delete credentials: {}", e)))?;

        if rows_affected == 0 {
            return Err(GatewayError::NotConnected);
        }
        Ok(())
    }

    /// Decrypts the refresh token held in `record`.
    ///
    /// Only the session materializer calls this, and it consumes the
    /// plaintext immediately.
    pub(crate) fn reveal_refresh_token(&self, record: &CredentialRecord) -> Result<String> {
        self.cipher.open(&record.encrypted_refresh_token)
    }

    /// Removes every record connected before `cutoff`, returning how many went.
    ///
    /// Housekeeping entry point for an external cleanup job.
    pub fn purge_connected_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let deleted = self
            .conn()?
            .execute(
                "DELETE FROM sf_tokens WHERE connected_at < ?1",
                params![timestamp(&cutoff)],
            )
            .map_err(|e| GatewayError::Storage(format!("failed to purge credentials: {}", e)))?;

        debug!(deleted, cutoff = %cutoff, "Purged stale credentials");
        Ok(deleted)
    }

    /// Counts stored connections overall and by recency relative to `now`.
    pub fn stats(&self, now: DateTime<Utc>) -> Result<VaultStats> {
        let conn = self.conn()?;
        let count_since = |since: Option<DateTime<Utc>>| -> Result<u64> {
            let count: i64 = match since {
                Some(since) => conn.query_row(
                    "SELECT COUNT(*) FROM sf_tokens WHERE connected_at >= ?1",
                    params![timestamp(&since)],
                    |row| row.get(0),
                ),
                None => conn.query_row("SELECT COUNT(*) FROM sf_tokens", [], |row| row.get(0)),
            }
            .map_err(|e| GatewayError::Storage(format!("failed to count credentials: {}", e)))?;
            Ok(count.max(0) as u64)
        };

        Ok(VaultStats {
            total: count_since(None)?,
            connected_last_week: count_since(Some(now - Duration::days(7)))?,
            connected_last_month: count_since(Some(now - Duration::days(30)))?,
        })
    }
}

/// Fixed-width UTC timestamp so lexical order in SQLite matches time order.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GatewayError::Storage(format!("invalid connected_at timestamp: {}", e)))
}
