//! Portal Gateway Library
//!
//! Request authentication and session resolution for the learning portal
//! API: bearer credential decoding, risk-based validation strategies,
//! session recovery, and role gating.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;

pub mod api;
pub mod config;
pub mod db;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AuthUser};

use config::SessionBackend;
use services::{AuthPipeline, MemorySessionStore, RoleGate, SessionStore, SessionTtl, SqliteSessionStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed at startup
    pub config: Arc<AppConfig>,
    /// Session store backing the full validation strategy
    pub sessions: Arc<dyn SessionStore>,
    pub pipeline: Arc<AuthPipeline>,
    pub role_gate: Arc<RoleGate>,
}

impl AppState {
    /// Build the state, creating the configured session store
    pub async fn new(config: AppConfig) -> Result<Self> {
        let sessions = build_store(&config).await?;
        Ok(Self::with_store(config, sessions))
    }

    /// Build the state around an existing session store
    pub fn with_store(config: AppConfig, sessions: Arc<dyn SessionStore>) -> Self {
        let pipeline = AuthPipeline::new(&config, sessions.clone());
        let role_gate = RoleGate::new(&config.auth, config.environment);

        Self {
            config: Arc::new(config),
            sessions,
            pipeline: Arc::new(pipeline),
            role_gate: Arc::new(role_gate),
        }
    }
}

/// Create the session store selected by configuration
pub async fn build_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>> {
    let ttl = SessionTtl::from(&config.sessions);

    let store: Arc<dyn SessionStore> = match config.sessions.backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new(ttl, config.sessions.max_entries)),
        SessionBackend::Sqlite => {
            let pool = db::init_pool(
                &config.sessions.database_url,
                config.sessions.max_connections,
            )
            .await?;
            Arc::new(SqliteSessionStore::new(pool, ttl))
        }
    };

    Ok(store)
}

/// API router: public routes plus the authenticated routes behind
/// [`auth_middleware`]
///
/// Authentication is not applied globally, so health probes stay reachable.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api::public_routes())
        .nest(
            "/api/v1",
            api::protected_routes(&state).layer(axum::middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state)
}
