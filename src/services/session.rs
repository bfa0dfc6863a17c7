//! Session store contract
//!
//! The authentication pipeline only consumes this trait. Two backends ship
//! with the crate: [`MemorySessionStore`](super::MemorySessionStore) and
//! [`SqliteSessionStore`](super::SqliteSessionStore).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ClientInfo, SessionHandle, SessionProfile, SessionRecord, SessionStats};

/// Session store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded
    #[error("corrupt session record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Durable or shared store of active sessions and revoked credentials
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Whether the credential was explicitly revoked
    async fn is_blacklisted(&self, token: &str) -> Result<bool, StoreError>;

    /// Look up a live session, refreshing its last-activity time
    async fn validate(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Create a session.
    ///
    /// When `profile.recovery_key` is set and a live session was already
    /// created under that key, the existing session is returned with
    /// `created == false`.
    async fn create(
        &self,
        profile: &SessionProfile,
        client: &ClientInfo,
        remember: bool,
    ) -> Result<SessionHandle, StoreError>;

    /// Revoke a credential for `ttl`
    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a session; `false` when it did not exist
    async fn destroy(&self, session_id: &str) -> Result<bool, StoreError>;

    async fn stats(&self) -> Result<SessionStats, StoreError>;

    /// Drop expired sessions and revocations, returning how many were removed
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

/// Stable digest used to key revoked credentials, so raw tokens are never
/// persisted
pub fn token_fingerprint(token: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lifetimes applied by store backends
#[derive(Debug, Clone, Copy)]
pub struct SessionTtl {
    pub standard: Duration,
    pub remember: Duration,
}

impl SessionTtl {
    pub fn new(standard: Duration, remember: Duration) -> Self {
        Self { standard, remember }
    }

    pub fn for_remember(&self, remember: bool) -> Duration {
        if remember {
            self.remember
        } else {
            self.standard
        }
    }
}

impl From<&crate::config::SessionConfig> for SessionTtl {
    fn from(config: &crate::config::SessionConfig) -> Self {
        Self::new(
            Duration::from_secs(config.ttl_secs),
            Duration::from_secs(config.remember_ttl_secs),
        )
    }
}

/// Spawn a background task that periodically purges expired entries
pub fn spawn_session_cleanup(
    store: std::sync::Arc<dyn SessionStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
            }
        }
    })
}
