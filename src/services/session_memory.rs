//! In-memory session store
//!
//! Keeps sessions and revocations in process memory with TTL tracking.
//! Suitable for development and single-instance deployments.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::session::{token_fingerprint, SessionStore, SessionTtl, StoreError};
use crate::models::{ClientInfo, SessionHandle, SessionProfile, SessionRecord, SessionStats};

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, SessionRecord>,
    /// recovery key -> session id
    recovered: HashMap<String, String>,
    /// token fingerprint -> revocation expiry
    revoked: HashMap<String, Instant>,
}

impl Inner {
    fn live_session(&self, session_id: &str) -> Option<&SessionRecord> {
        self.sessions.get(session_id).filter(|r| !r.is_expired())
    }

    fn purge(&mut self) -> usize {
        let before = self.sessions.len() + self.revoked.len();
        let now = Instant::now();
        self.sessions.retain(|_, record| !record.is_expired());
        self.revoked.retain(|_, until| *until > now);
        let sessions = &self.sessions;
        self.recovered.retain(|_, id| sessions.contains_key(id));
        before - (self.sessions.len() + self.revoked.len())
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|(_, record)| record.last_activity)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            self.sessions.remove(&id);
            self.recovered.retain(|_, sid| *sid != id);
        }
    }
}

/// Session store held in process memory
#[derive(Debug)]
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
    ttl: SessionTtl,
    max_entries: usize,
}

impl MemorySessionStore {
    pub fn new(ttl: SessionTtl, max_entries: usize) -> Self {
        info!(max_entries, "Using in-memory session store");
        Self {
            inner: RwLock::new(Inner::default()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Number of stored sessions, expired ones included
    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn is_blacklisted(&self, token: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .revoked
            .get(&token_fingerprint(token))
            .map(|until| *until > Instant::now())
            .unwrap_or(false))
    }

    async fn validate(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let expired = match inner.sessions.get(session_id) {
            Some(record) => record.is_expired(),
            None => return Ok(None),
        };
        if expired {
            inner.sessions.remove(session_id);
            return Ok(None);
        }

        let Some(record) = inner.sessions.get_mut(session_id) else {
            return Ok(None);
        };
        let ttl = chrono::Duration::from_std(self.ttl.for_remember(record.remember))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let now = Utc::now();
        record.last_activity = now;
        record.expires_at = now + ttl;
        Ok(Some(record.clone()))
    }

    async fn create(
        &self,
        profile: &SessionProfile,
        client: &ClientInfo,
        remember: bool,
    ) -> Result<SessionHandle, StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(key) = profile.recovery_key.as_deref() {
            if let Some(existing) = inner.recovered.get(key).cloned() {
                if inner.live_session(&existing).is_some() {
                    debug!(session_id = %existing, "Reusing recovered session");
                    return Ok(SessionHandle {
                        session_id: existing,
                        created: false,
                    });
                }
            }
        }

        if inner.sessions.len() >= self.max_entries {
            inner.purge();
        }
        if inner.sessions.len() >= self.max_entries {
            inner.evict_oldest();
        }

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl.for_remember(remember))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let session_id = Uuid::new_v4().to_string();
        let record = SessionRecord {
            session_id: session_id.clone(),
            user_id: profile.user_id.clone(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            role: profile.role.clone(),
            institution_id: profile.institution_id.clone(),
            permissions: profile.permissions.clone(),
            client: client.clone(),
            created_at: now,
            last_activity: now,
            expires_at: now + ttl,
            remember,
        };

        inner.sessions.insert(session_id.clone(), record);
        if let Some(key) = profile.recovery_key.clone() {
            inner.recovered.insert(key, session_id.clone());
        }

        Ok(SessionHandle {
            session_id,
            created: true,
        })
    }

    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Ok(());
        }
        let mut inner = self.inner.write().await;
        inner
            .revoked
            .insert(token_fingerprint(token), Instant::now() + ttl);
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let removed = inner.sessions.remove(session_id).is_some();
        if removed {
            inner.recovered.retain(|_, id| id != session_id);
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<SessionStats, StoreError> {
        let inner = self.inner.read().await;
        let now = Instant::now();
        let mut stats = SessionStats::default();
        let mut users = HashSet::new();

        for record in inner.sessions.values().filter(|r| !r.is_expired()) {
            stats.active_sessions += 1;
            users.insert(record.user_id.as_str());
            *stats
                .sessions_by_device
                .entry(record.client.device_type.to_string())
                .or_default() += 1;
        }
        stats.active_users = users.len();
        stats.revoked_tokens = inner.revoked.values().filter(|until| **until > now).count();

        Ok(stats)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(self.inner.write().await.purge())
    }
}
