//! Role and permission middleware
//!
//! Route-level guards backed by the [`RoleGate`](crate::services::RoleGate).
//! They must run after [`auth_middleware`](super::auth_middleware).

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    utils::error::{AuthRejection, RejectionKind},
    AppState,
};

use super::auth::AuthUser;

/// Roles accepted by a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireRoles(pub Vec<String>);

impl RequireRoles {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }
}

/// Permissions of which a route needs at least one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireAnyPermission(pub Vec<String>);

impl RequireAnyPermission {
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(permissions.into_iter().map(Into::into).collect())
    }
}

fn authenticated(request: &Request) -> Result<&AuthUser, AuthRejection> {
    request.extensions().get::<AuthUser>().ok_or_else(|| {
        AuthRejection::new(RejectionKind::NoCredential).with_message("Authentication required")
    })
}

/// Middleware factory for requiring one of a set of roles
///
/// Usage:
/// ```ignore
/// let app = Router::new()
///     .route("/dashboard/sessions", get(session_stats))
///     .layer(axum::middleware::from_fn_with_state(
///         state.clone(),
///         |state, req, next| require_role_middleware(
///             state,
///             req,
///             next,
///             RequireRoles::new(["admin"]),
///         ),
///     ));
/// ```
pub async fn require_role_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
    roles: RequireRoles,
) -> Result<Response, AuthRejection> {
    let auth_user = authenticated(&request)?;
    state.role_gate.authorize(&auth_user.claim, &roles.0)?;
    Ok(next.run(request).await)
}

/// Middleware factory for requiring any one of a set of permissions
pub async fn require_any_permission_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
    permissions: RequireAnyPermission,
) -> Result<Response, AuthRejection> {
    let auth_user = authenticated(&request)?;
    state
        .role_gate
        .authorize_any(&auth_user.claim, &permissions.0)?;
    Ok(next.run(request).await)
}

/// Create a middleware layer that requires one of the given roles
#[macro_export]
macro_rules! require_roles {
    ($state:expr, $($role:expr),+ $(,)?) => {
        axum::middleware::from_fn_with_state($state.clone(), move |state, req, next| {
            $crate::middleware::rbac::require_role_middleware(
                state,
                req,
                next,
                $crate::middleware::rbac::RequireRoles::new([$($role),+]),
            )
        })
    };
}

/// Create a middleware layer that requires any of the given permissions
#[macro_export]
macro_rules! require_any_permission {
    ($state:expr, $($permission:expr),+ $(,)?) => {
        axum::middleware::from_fn_with_state($state.clone(), move |state, req, next| {
            $crate::middleware::rbac::require_any_permission_middleware(
                state,
                req,
                next,
                $crate::middleware::rbac::RequireAnyPermission::new([$($permission),+]),
            )
        })
    };
}
