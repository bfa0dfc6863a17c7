//! Test fixtures for common test data
//!
//! Fixtures provide pre-defined identities and raw credentials that can be
//! used across multiple tests.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde_json::{json, Value};

use portal_gateway::models::IdentityClaim;

/// Signing secret used by every test configuration
pub const TEST_SECRET: &str = "test_secret_key_that_is_at_least_32_bytes_long";

/// Test identity fixtures
pub struct IdentityFixtures;

impl IdentityFixtures {
    pub fn teacher() -> IdentityClaim {
        IdentityClaim::new("42")
            .with_email("teacher@example.com")
            .with_name("Test Teacher")
            .with_role("teacher")
            .with_permissions(["courses.view", "courses.edit"])
            .with_institution("inst-1")
    }

    pub fn student() -> IdentityClaim {
        IdentityClaim::new("77")
            .with_email("student@example.com")
            .with_role("student")
            .with_permissions(["courses.view"])
    }

    pub fn admin() -> IdentityClaim {
        IdentityClaim::new("1")
            .with_email("admin@example.com")
            .with_role("admin")
    }

    /// Privileged role, in the casing the portal stores it
    pub fn system_admin() -> IdentityClaim {
        IdentityClaim::new("0")
            .with_email("root@example.com")
            .with_role("SYSTEM_ADMIN")
    }

    /// Identity whose credential carries an empty role
    pub fn roleless() -> IdentityClaim {
        IdentityClaim::new("500").with_email("nobody@example.com").with_role("")
    }
}

/// Legacy credential payload for the teacher fixture, valid for an hour
pub fn legacy_teacher_payload() -> Value {
    json!({
        "userId": "42",
        "email": "a@b.com",
        "role": "teacher",
        "exp": Utc::now().timestamp() + 3600,
    })
}

/// Encode a legacy (unsigned) credential
pub fn legacy_token(payload: &Value) -> String {
    STANDARD.encode(payload.to_string())
}
