//! Identity claim model
//!
//! The normalized identity produced by credential decoding and, for
//! session-backed credentials, refined with the session store's profile.

use serde::{Deserialize, Serialize};

use crate::models::SessionRecord;

/// Role assigned when a credential carries no `role` field at all
pub const DEFAULT_ROLE: &str = "user";

/// Normalized identity of the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaim {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    /// `None` only when the credential explicitly carried an empty role
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl IdentityClaim {
    /// Create a claim with only the subject set and default profile fields
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: String::new(),
            name: String::new(),
            role: Some(DEFAULT_ROLE.to_string()),
            permissions: Vec::new(),
            institution_id: None,
            session_id: None,
            issued_at: None,
            expires_at: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = normalize_role(Some(role.into()));
        self
    }

    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_institution(mut self, institution_id: impl Into<String>) -> Self {
        self.institution_id = Some(institution_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Role name, or `None` when the identity carries no role
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Check whether the identity holds a role, ignoring case
    pub fn has_role(&self, role: &str) -> bool {
        self.role()
            .map(|r| r.eq_ignore_ascii_case(role))
            .unwrap_or(false)
    }

    /// Replace the mutable profile fields with the session store's copy.
    ///
    /// The store is authoritative for profile and grants, so an emptied
    /// permission list or cleared institution takes effect immediately.
    /// Issuance and expiry stay as the credential stated them.
    pub fn merge_session(&mut self, record: &SessionRecord) {
        self.email = record.email.clone();
        self.name = record.name.clone();
        self.role = normalize_role(Some(record.role.clone()));
        self.permissions = record.permissions.clone();
        self.institution_id = record.institution_id.clone();
        self.session_id = Some(record.session_id.clone());
    }
}

/// Map a raw role field onto the claim's representation.
///
/// An absent field means the default role; a blank one means no role.
pub fn normalize_role(raw: Option<String>) -> Option<String> {
    match raw {
        None => Some(DEFAULT_ROLE.to_string()),
        Some(role) if role.trim().is_empty() => None,
        Some(role) => Some(role),
    }
}
