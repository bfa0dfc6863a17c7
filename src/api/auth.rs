//! Authentication API endpoints
//!
//! Current identity lookup and logout.

use std::time::Duration;

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::{
    middleware::AuthUser,
    models::IdentityClaim,
    services::{extract_bearer, Strategy, ValidationMode},
    utils::error::{AppError, AppResult},
    AppState,
};

/// Create protected routes for authentication endpoints (auth required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_current_user))
        .route("/logout", post(logout))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserResponse {
    pub success: bool,
    pub user: IdentityClaim,
    pub strategy: Strategy,
    pub validation: ValidationMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
    pub session_destroyed: bool,
}

/// Get current user handler
///
/// GET /api/v1/auth/me
async fn get_current_user(auth_user: AuthUser) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        success: true,
        user: auth_user.claim,
        strategy: auth_user.strategy,
        validation: auth_user.mode,
    })
}

/// How long a credential must stay revoked
///
/// Decoding accepts a token until `exp + leeway`, so the revocation has to
/// outlive that window too.
fn revocation_ttl(claim: &IdentityClaim, fallback: Duration, leeway: Duration) -> Duration {
    match claim.expires_at {
        Some(exp) => {
            let remaining = (exp - Utc::now().timestamp()).max(0) as u64;
            Duration::from_secs(remaining) + leeway
        }
        None => fallback,
    }
}

/// Logout handler
///
/// POST /api/v1/auth/logout
///
/// Revokes the presented credential for the rest of its lifetime and
/// destroys the session backing it.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    auth_user: AuthUser,
) -> AppResult<Json<LogoutResponse>> {
    let credential = extract_bearer(&headers)
        .map_err(|e| AppError::BadRequest(e.message))?;

    let ttl = revocation_ttl(
        &auth_user.claim,
        Duration::from_secs(state.config.sessions.ttl_secs),
        Duration::from_secs(state.config.auth.leeway_secs),
    );
    state.sessions.blacklist(credential, ttl).await?;

    let session_destroyed = match auth_user.session_id() {
        Some(session_id) => state.sessions.destroy(session_id).await?,
        None => false,
    };

    info!(
        user_id = %auth_user.user_id(),
        session_destroyed,
        "User logged out"
    );

    Ok(Json(LogoutResponse {
        success: true,
        message: "Logged out successfully".to_string(),
        session_destroyed,
    }))
}
