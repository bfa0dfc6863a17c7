//! Middleware components
//!
//! This module contains middleware for:
//! - Authentication (bearer credentials and sessions)
//! - Authorization (roles and permissions)

pub mod auth;
pub mod rbac;

pub use auth::{auth_middleware, AuthUser, SESSION_ID_HEADER};
pub use rbac::{
    require_any_permission_middleware, require_role_middleware, RequireAnyPermission,
    RequireRoles,
};
