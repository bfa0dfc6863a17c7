//! Mock services for testing
//!
//! Provides a session store that records how the pipeline uses it and can
//! simulate slow or failing backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use portal_gateway::{
    models::{ClientInfo, SessionHandle, SessionProfile, SessionRecord, SessionStats},
    services::{MemorySessionStore, SessionStore, SessionTtl, StoreError},
};

/// Types of errors the mock can simulate
#[derive(Debug, Clone)]
pub enum MockError {
    /// Every call fails as unavailable
    ConnectionRefused,
    /// Every call sleeps this long before answering
    Timeout(Duration),
    /// Every call fails with a custom message
    InternalError(String),
}

/// Calls observed by [`MockSessionStore`]
#[derive(Debug, Default)]
pub struct CallCounts {
    pub is_blacklisted: AtomicUsize,
    pub validate: AtomicUsize,
    pub create: AtomicUsize,
    pub blacklist: AtomicUsize,
    pub destroy: AtomicUsize,
}

impl CallCounts {
    pub fn validate(&self) -> usize {
        self.validate.load(Ordering::SeqCst)
    }

    pub fn create(&self) -> usize {
        self.create.load(Ordering::SeqCst)
    }

    pub fn is_blacklisted(&self) -> usize {
        self.is_blacklisted.load(Ordering::SeqCst)
    }

    /// Calls that reach the store during request resolution
    pub fn resolution_calls(&self) -> usize {
        self.is_blacklisted() + self.validate() + self.create()
    }
}

/// In-memory session store with call accounting and error injection
pub struct MockSessionStore {
    inner: MemorySessionStore,
    pub calls: CallCounts,
    /// Simulate errors when set
    pub error_mode: Arc<RwLock<Option<MockError>>>,
}

impl Default for MockSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSessionStore {
    pub fn new() -> Self {
        Self {
            inner: MemorySessionStore::new(
                SessionTtl::new(Duration::from_secs(900), Duration::from_secs(3600)),
                1_000,
            ),
            calls: CallCounts::default(),
            error_mode: Arc::new(RwLock::new(None)),
        }
    }

    /// Set error mode to simulate failures
    pub fn set_error_mode(&self, error: MockError) {
        *self.error_mode.write().unwrap() = Some(error);
    }

    /// Clear error mode
    pub fn clear_error_mode(&self) {
        *self.error_mode.write().unwrap() = None;
    }

    /// Direct access to the backing store, bypassing counters and errors
    pub fn backing(&self) -> &MemorySessionStore {
        &self.inner
    }

    /// Seed a session for `profile`
    pub async fn seed(&self, profile: &SessionProfile) -> String {
        self.inner
            .create(profile, &ClientInfo::default(), false)
            .await
            .unwrap()
            .session_id
    }

    async fn check_error(&self) -> Result<(), StoreError> {
        let error = self.error_mode.read().unwrap().clone();
        match error {
            None => Ok(()),
            Some(MockError::ConnectionRefused) => {
                Err(StoreError::Unavailable("connection refused".to_string()))
            }
            Some(MockError::Timeout(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Some(MockError::InternalError(message)) => Err(StoreError::Unavailable(message)),
        }
    }
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn is_blacklisted(&self, token: &str) -> Result<bool, StoreError> {
        self.calls.is_blacklisted.fetch_add(1, Ordering::SeqCst);
        self.check_error().await?;
        self.inner.is_blacklisted(token).await
    }

    async fn validate(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.calls.validate.fetch_add(1, Ordering::SeqCst);
        self.check_error().await?;
        self.inner.validate(session_id).await
    }

    async fn create(
        &self,
        profile: &SessionProfile,
        client: &ClientInfo,
        remember: bool,
    ) -> Result<SessionHandle, StoreError> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.check_error().await?;
        self.inner.create(profile, client, remember).await
    }

    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        self.calls.blacklist.fetch_add(1, Ordering::SeqCst);
        self.check_error().await?;
        self.inner.blacklist(token, ttl).await
    }

    async fn destroy(&self, session_id: &str) -> Result<bool, StoreError> {
        self.calls.destroy.fetch_add(1, Ordering::SeqCst);
        self.check_error().await?;
        self.inner.destroy(session_id).await
    }

    async fn stats(&self) -> Result<SessionStats, StoreError> {
        self.check_error().await?;
        self.inner.stats().await
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.inner.purge_expired().await
    }
}
