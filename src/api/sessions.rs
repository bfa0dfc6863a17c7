//! Session administration endpoints
//!
//! Both routes sit on high-risk paths, so they are served with token-only
//! validation and never create sessions themselves.

use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::{
    middleware::AuthUser,
    models::SessionStats,
    require_roles,
    utils::error::{AppError, AppResult},
    AppState,
};

/// Session routes; every route requires the `admin` role
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/dashboard/sessions", get(session_stats))
        .route("/sessions/{id}", delete(destroy_session))
        .route_layer(require_roles!(state, "admin"))
}

#[derive(Debug, Serialize)]
pub struct SessionStatsResponse {
    pub success: bool,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroySessionResponse {
    pub success: bool,
    pub session_id: String,
}

/// GET /api/v1/dashboard/sessions
async fn session_stats(State(state): State<AppState>) -> AppResult<Json<SessionStatsResponse>> {
    let stats = state.sessions.stats().await?;
    Ok(Json(SessionStatsResponse {
        success: true,
        stats,
    }))
}

/// DELETE /api/v1/sessions/{id}
async fn destroy_session(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(session_id): Path<String>,
) -> AppResult<Json<DestroySessionResponse>> {
    if !state.sessions.destroy(&session_id).await? {
        return Err(AppError::NotFound(format!("Session {} not found", session_id)));
    }

    info!(
        session_id = %session_id,
        by = %auth_user.user_id(),
        "Session destroyed by administrator"
    );

    Ok(Json(DestroySessionResponse {
        success: true,
        session_id,
    }))
}
