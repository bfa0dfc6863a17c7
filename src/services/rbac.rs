//! Role and permission gate
//!
//! Decides whether a resolved identity may reach a route. Rules, in order:
//! 1. an identity without any role is let through with a warning when
//!    `allow_missing_role` is set
//! 2. the privileged role passes every check
//! 3. otherwise the role must be one of the required roles (case-insensitive)

use serde_json::json;
use tracing::{debug, warn};

use crate::config::{AuthConfig, Environment};
use crate::models::IdentityClaim;
use crate::utils::error::{AuthRejection, RejectionKind};

#[derive(Debug, Clone)]
pub struct RoleGate {
    privileged_role: String,
    allow_missing_role: bool,
    expose_debug: bool,
}

impl RoleGate {
    pub fn new(config: &AuthConfig, environment: Environment) -> Self {
        Self {
            privileged_role: config.privileged_role.clone(),
            allow_missing_role: config.allow_missing_role,
            expose_debug: !environment.is_production(),
        }
    }

    pub fn privileged_role(&self) -> &str {
        &self.privileged_role
    }

    /// Outcome shared by both checks when the role alone decides
    fn role_shortcut(&self, identity: &IdentityClaim) -> Option<Result<(), AuthRejection>> {
        match identity.role() {
            None if self.allow_missing_role => {
                warn!(user_id = %identity.id, "Identity has no role, allowing access");
                Some(Ok(()))
            }
            None => Some(Err(self.reject(identity, json!({ "reason": "no role" })))),
            Some(_) if identity.has_role(&self.privileged_role) => Some(Ok(())),
            Some(_) => None,
        }
    }

    /// Require the identity's role to be one of `required`
    pub fn authorize<R: AsRef<str>>(
        &self,
        identity: &IdentityClaim,
        required: &[R],
    ) -> Result<(), AuthRejection> {
        if let Some(outcome) = self.role_shortcut(identity) {
            return outcome;
        }

        if required.iter().any(|r| identity.has_role(r.as_ref())) {
            return Ok(());
        }

        let required: Vec<&str> = required.iter().map(AsRef::as_ref).collect();
        debug!(user_id = %identity.id, role = ?identity.role(), ?required, "Role check failed");
        Err(self.reject(
            identity,
            json!({ "userRole": identity.role(), "requiredRoles": required }),
        ))
    }

    /// Require at least one of `required` among the identity's permissions
    pub fn authorize_any<P: AsRef<str>>(
        &self,
        identity: &IdentityClaim,
        required: &[P],
    ) -> Result<(), AuthRejection> {
        if let Some(outcome) = self.role_shortcut(identity) {
            return outcome;
        }

        let granted = required
            .iter()
            .any(|p| identity.permissions.iter().any(|held| held == p.as_ref()));
        if granted {
            return Ok(());
        }

        let required: Vec<&str> = required.iter().map(AsRef::as_ref).collect();
        debug!(user_id = %identity.id, ?required, "Permission check failed");
        Err(self.reject(
            identity,
            json!({
                "userPermissions": identity.permissions,
                "requiredPermissions": required,
            }),
        ))
    }

    fn reject(&self, identity: &IdentityClaim, detail: serde_json::Value) -> AuthRejection {
        let rejection = AuthRejection::new(RejectionKind::InsufficientRole);
        if self.expose_debug {
            rejection.with_debug(json!({ "userId": identity.id, "detail": detail }))
        } else {
            rejection
        }
    }
}
