//! Authentication middleware
//!
//! Runs the [`AuthPipeline`](crate::services::AuthPipeline) for every
//! protected request and attaches the resolved identity to the request.

use std::panic::AssertUnwindSafe;

use axum::{
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{request::Parts, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use futures::FutureExt;
use tracing::error;

use crate::{
    models::IdentityClaim,
    services::{Resolution, Strategy, ValidationMode},
    utils::error::{AuthRejection, RejectionKind},
    AppState,
};

/// Response header announcing the session that replaced a missing one
pub const SESSION_ID_HEADER: HeaderName = HeaderName::from_static("x-session-id");

/// Authenticated caller, as attached by [`auth_middleware`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub claim: IdentityClaim,
    pub strategy: Strategy,
    pub mode: ValidationMode,
}

impl From<Resolution> for AuthUser {
    fn from(resolution: Resolution) -> Self {
        Self {
            claim: resolution.claim,
            strategy: resolution.strategy,
            mode: resolution.mode,
        }
    }
}

impl AuthUser {
    pub fn user_id(&self) -> &str {
        &self.claim.id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.claim.session_id.as_deref()
    }

    pub fn is_degraded(&self) -> bool {
        self.mode == ValidationMode::Degraded
    }
}

/// Extractor for AuthUser from request extensions
///
/// This allows using AuthUser as a handler parameter after auth middleware has run.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            AuthRejection::new(RejectionKind::NoCredential).with_message("Authentication required")
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Authentication middleware
///
/// Resolves the caller with the strategy chosen for the request path. On
/// success the [`AuthUser`] and its [`IdentityClaim`] are inserted into the
/// request extensions. A panic inside the pipeline becomes a plain 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    // Nested routers see a stripped URI; classify the path the client sent
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let resolution = AssertUnwindSafe(state.pipeline.resolve(&path, request.headers()))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            error!(path = %path, panic = panic_message(panic.as_ref()), "Authentication pipeline panicked");
            Err(AuthRejection::new(RejectionKind::MalformedCredential)
                .with_message("Authentication failed"))
        })?;

    let recreated = resolution.recreated_session.clone();
    let auth_user = AuthUser::from(resolution);
    request.extensions_mut().insert(auth_user.claim.clone());
    request.extensions_mut().insert(auth_user);

    let mut response = next.run(request).await;

    if let Some(session_id) = recreated {
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            response.headers_mut().insert(SESSION_ID_HEADER, value);
        }
    }

    Ok(response)
}
