//! Exchange state storage for the authorization round trip.
//!
//! Maps the opaque `state` sent to the authorization server to the PKCE
//! verifier that must accompany the code exchange. Entries are single-use and
//! expire after a short window.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Storage seam for pending authorization round trips.
///
/// Implementations must make `take` atomic: one state yields its verifier at
/// most once, even under concurrent callers. A shared external store can stand
/// in for [`InMemoryStateStore`] when several gateway processes issue
/// authorization URLs.
#[async_trait]
pub trait ExchangeStateStore: Send + Sync {
    /// Register `state -> verifier`.
    async fn put(&self, state: &str, verifier: &str) -> Result<()>;

    /// Remove and return the verifier for `state`.
    ///
    /// `None` when the state is unknown, already taken or expired.
    async fn take(&self, state: &str) -> Result<Option<String>>;
}

/// Pending exchange entry
#[derive(Clone)]
struct StateEntry {
    verifier: String,
    created_at: DateTime<Utc>,
}

/// Process-local exchange state store with expiry
#[derive(Clone)]
pub struct InMemoryStateStore {
    states: Arc<DashMap<String, StateEntry>>,
    expiry_duration: Duration,
}

impl InMemoryStateStore {
    /// Create a new store
    ///
    /// # Arguments
    /// * `expiry_seconds` - How long states remain valid (default config: 600)
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            states: Arc::new(DashMap::new()),
            expiry_duration: Duration::seconds(expiry_seconds),
        }
    }

    fn is_expired(&self, entry: &StateEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at > self.expiry_duration
    }

    /// Drop expired states
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.states
            .retain(|_, entry| now - entry.created_at <= self.expiry_duration);
    }

    /// Number of pending states (for debugging/monitoring)
    pub fn count(&self) -> usize {
        self.states.len()
    }
}

#[async_trait]
impl ExchangeStateStore for InMemoryStateStore {
    async fn put(&self, state: &str, verifier: &str) -> Result<()> {
        self.states.insert(
            state.to_string(),
            StateEntry {
                verifier: verifier.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn take(&self, state: &str) -> Result<Option<String>> {
        // remove() is atomic per key: a concurrent second caller sees None
        let Some((_, entry)) = self.states.remove(state) else {
            return Ok(None);
        };

        if self.is_expired(&entry, Utc::now()) {
            return Ok(None);
        }

        Ok(Some(entry.verifier))
    }
}

/// Background task to periodically clean up expired states
pub async fn run_state_cleanup(store: InMemoryStateStore, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        store.cleanup_expired();
        tracing::debug!(
            remaining = store.count(),
            "Exchange state cleanup complete"
        );
    }
}
