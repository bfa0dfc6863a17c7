//! API endpoint integration tests
//!
//! Exercise the routes end to end: credential rejection codes, identity
//! resolution, logout revocation and role-gated session administration.

use chrono::Duration;
use serde_json::{json, Value};

use portal_gateway::{models::SessionProfile, services::SessionStore};

use crate::common::{
    legacy_teacher_payload, legacy_token, production_config, test_config, test_config_sqlite,
    IdentityFixtures, TestApp, TEST_SECRET,
};

// ==================== Health Endpoints ====================

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health").await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_detailed_health_reports_session_store() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health/detailed").await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["components"]["session_store"]["status"], "healthy");
    assert_eq!(json["environment"], "development");
}

#[tokio::test]
async fn test_liveness_and_readiness() {
    let app = TestApp::new().await;
    app.get("/api/v1/health/live").await.assert_ok();
    app.get("/api/v1/health/ready").await.assert_ok();
}

// ==================== Credential Rejections ====================

#[tokio::test]
async fn test_missing_header_is_no_credential() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/auth/me").await;

    response.assert_unauthorized();
    assert_eq!(response.code(), "NO_CREDENTIAL");
    let json: Value = response.json();
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_non_bearer_scheme_is_no_credential() {
    let app = TestApp::new().await;
    let response = app
        .get_with_authorization("/api/v1/auth/me", "Basic dXNlcjpwYXNz")
        .await;

    response.assert_unauthorized();
    assert_eq!(response.code(), "NO_CREDENTIAL");
}

#[tokio::test]
async fn test_short_credential_is_malformed() {
    let app = TestApp::new().await;
    let response = app.get_with_token("/api/v1/auth/me", "short").await;

    response.assert_unauthorized();
    assert_eq!(response.code(), "MALFORMED_CREDENTIAL");
}

#[tokio::test]
async fn test_garbage_credential_is_malformed() {
    let app = TestApp::new().await;
    let response = app
        .get_with_token("/api/v1/auth/me", "not!base64@all####")
        .await;

    response.assert_unauthorized();
    assert_eq!(response.code(), "MALFORMED_CREDENTIAL");
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = TestApp::new().await;
    let token = app.token_with_ttl(&IdentityFixtures::teacher(), Duration::minutes(-5));

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_unauthorized();
    assert_eq!(response.code(), "EXPIRED");
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_invalid() {
    let app = TestApp::new().await;

    let mut other = test_config();
    other.auth.jwt_secret = format!("{}-rotated", TEST_SECRET);
    let other_app = TestApp::with_config(other).await;
    let token = other_app.token_for(&IdentityFixtures::teacher());

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_unauthorized();
    assert_eq!(response.code(), "INVALID_SIGNATURE");
}

#[tokio::test]
async fn test_rejection_includes_debug_outside_production() {
    let app = TestApp::new().await;
    let token = app.token_with_ttl(&IdentityFixtures::teacher(), Duration::minutes(-5));

    let response = app.get_with_token("/api/v1/auth/me", &token).await;
    let json: Value = response.json();
    assert!(json.get("debug").is_some());
}

// ==================== Identity Resolution ====================

#[tokio::test]
async fn test_me_with_signed_token_without_session() {
    let app = TestApp::new().await;
    let token = app.token_for(&IdentityFixtures::teacher());

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["success"], true);
    assert_eq!(json["user"]["id"], "42");
    assert_eq!(json["user"]["role"], "teacher");
    assert_eq!(json["user"]["institutionId"], "inst-1");
    assert_eq!(json["strategy"], "full");
    assert_eq!(json["validation"], "full");
    assert!(response.session_header().is_none());
}

#[tokio::test]
async fn test_me_merges_session_profile() {
    let app = TestApp::new().await;
    let teacher = IdentityFixtures::teacher();

    let mut profile = SessionProfile::from_claim(&teacher);
    profile.name = "Updated Name".to_string();
    profile.role = "admin".to_string();
    let handle = app
        .state
        .sessions
        .create(&profile, &Default::default(), false)
        .await
        .unwrap();

    let token = app.token_for(&teacher.with_session(handle.session_id.clone()));
    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["user"]["name"], "Updated Name");
    assert_eq!(json["user"]["role"], "admin");
    assert_eq!(json["user"]["sessionId"], handle.session_id);
    assert!(response.session_header().is_none());
}

#[tokio::test]
async fn test_missing_session_is_recreated() {
    let app = TestApp::new().await;
    let token = app.token_for(&IdentityFixtures::teacher().with_session("gone-session"));

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_ok();
    let new_id = response.session_header().expect("X-Session-Id header");
    assert_ne!(new_id, "gone-session");

    let json: Value = response.json();
    assert_eq!(json["user"]["sessionId"], new_id);

    let record = app.state.sessions.validate(&new_id).await.unwrap();
    assert_eq!(record.unwrap().user_id, "42");
}

#[tokio::test]
async fn test_missing_session_rejected_when_recreation_disabled() {
    let mut config = test_config();
    config.auth.recreate_missing_sessions = false;
    let app = TestApp::with_config(config).await;
    let token = app.token_for(&IdentityFixtures::teacher().with_session("gone-session"));

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_unauthorized();
    assert_eq!(response.code(), "SESSION_MISSING");
}

#[tokio::test]
async fn test_legacy_token_accepted_in_development() {
    let app = TestApp::new().await;
    let token = legacy_token(&legacy_teacher_payload());

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["user"]["id"], "42");
    assert_eq!(json["user"]["email"], "a@b.com");
    assert_eq!(json["user"]["role"], "teacher");
}

#[tokio::test]
async fn test_expired_legacy_token_is_rejected() {
    let app = TestApp::new().await;
    let token = legacy_token(&json!({
        "userId": "42",
        "email": "a@b.com",
        "role": "teacher",
        "exp": 1,
    }));

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_unauthorized();
    assert_eq!(response.code(), "EXPIRED");
}

#[tokio::test]
async fn test_legacy_token_rejected_in_production() {
    let app = TestApp::with_config(production_config()).await;
    let token = legacy_token(&legacy_teacher_payload());

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_unauthorized();
    assert_eq!(response.code(), "MALFORMED_CREDENTIAL");
    let json: Value = response.json();
    assert!(json.get("debug").is_none());
}

// ==================== Logout ====================

#[tokio::test]
async fn test_logout_revokes_token_and_destroys_session() {
    let app = TestApp::new().await;
    let teacher = IdentityFixtures::teacher();
    let handle = app
        .state
        .sessions
        .create(&SessionProfile::from_claim(&teacher), &Default::default(), false)
        .await
        .unwrap();
    let token = app.token_for(&teacher.with_session(handle.session_id.clone()));

    let response = app.post_with_token("/api/v1/auth/logout", &token).await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["sessionDestroyed"], true);

    assert!(app.state.sessions.is_blacklisted(&token).await.unwrap());
    assert!(app
        .state
        .sessions
        .validate(&handle.session_id)
        .await
        .unwrap()
        .is_none());

    let response = app.get_with_token("/api/v1/auth/me", &token).await;
    response.assert_unauthorized();
    assert_eq!(response.code(), "SESSION_MISSING");
}

#[tokio::test]
async fn test_revoked_token_still_passes_high_risk_routes() {
    let app = TestApp::new().await;
    let token = app.token_for(&IdentityFixtures::admin());

    app.post_with_token("/api/v1/auth/logout", &token)
        .await
        .assert_ok();

    // Token-only validation never consults the revocation list
    app.get_with_token("/api/v1/dashboard/sessions", &token)
        .await
        .assert_ok();
}

// ==================== Session Administration ====================

#[tokio::test]
async fn test_session_stats_requires_admin() {
    let app = TestApp::new().await;
    let token = app.token_for(&IdentityFixtures::teacher());

    let response = app.get_with_token("/api/v1/dashboard/sessions", &token).await;

    response.assert_forbidden();
    assert_eq!(response.code(), "INSUFFICIENT_ROLE");
    let json: Value = response.json();
    assert_eq!(json["debug"]["detail"]["userRole"], "teacher");
}

#[tokio::test]
async fn test_forbidden_in_production_has_no_debug() {
    let app = TestApp::with_config(production_config()).await;
    let token = app.token_for(&IdentityFixtures::student());

    let response = app.get_with_token("/api/v1/dashboard/sessions", &token).await;

    response.assert_forbidden();
    let json: Value = response.json();
    assert!(json.get("debug").is_none());
}

#[tokio::test]
async fn test_session_stats_for_admin() {
    let app = TestApp::new().await;
    let teacher = IdentityFixtures::teacher();
    app.state
        .sessions
        .create(&SessionProfile::from_claim(&teacher), &Default::default(), false)
        .await
        .unwrap();

    let token = app.token_for(&IdentityFixtures::admin());
    let response = app.get_with_token("/api/v1/dashboard/sessions", &token).await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["stats"]["activeSessions"], 1);
    assert_eq!(json["stats"]["activeUsers"], 1);
}

#[tokio::test]
async fn test_privileged_role_bypasses_role_gate() {
    let app = TestApp::new().await;
    let token = app.token_for(&IdentityFixtures::system_admin());

    app.get_with_token("/api/v1/dashboard/sessions", &token)
        .await
        .assert_ok();
}

#[tokio::test]
async fn test_roleless_identity_follows_configuration() {
    let app = TestApp::new().await;
    let token = app.token_for(&IdentityFixtures::roleless());
    app.get_with_token("/api/v1/dashboard/sessions", &token)
        .await
        .assert_ok();

    let mut config = test_config();
    config.auth.allow_missing_role = false;
    let strict = TestApp::with_config(config).await;
    let token = strict.token_for(&IdentityFixtures::roleless());
    strict
        .get_with_token("/api/v1/dashboard/sessions", &token)
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_destroy_session() {
    let app = TestApp::new().await;
    let handle = app
        .state
        .sessions
        .create(
            &SessionProfile::from_claim(&IdentityFixtures::student()),
            &Default::default(),
            false,
        )
        .await
        .unwrap();
    let token = app.token_for(&IdentityFixtures::admin());
    let uri = format!("/api/v1/sessions/{}", handle.session_id);

    let response = app.delete_with_token(&uri, &token).await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["sessionId"], handle.session_id);

    app.delete_with_token(&uri, &token).await.assert_not_found();
}

// ==================== SQLite Backend ====================

#[tokio::test]
async fn test_full_flow_with_sqlite_store() {
    let app = TestApp::with_config(test_config_sqlite()).await;
    let token = app.token_for(&IdentityFixtures::teacher().with_session("lost"));

    let first = app.get_with_token("/api/v1/auth/me", &token).await;
    first.assert_ok();
    let recreated = first.session_header().expect("X-Session-Id header");

    // The same credential maps onto the recovered session
    let second = app.get_with_token("/api/v1/auth/me", &token).await;
    second.assert_ok();
    assert_eq!(second.session_header().as_deref(), Some(recreated.as_str()));

    let admin = app.token_for(&IdentityFixtures::admin());
    let stats = app.get_with_token("/api/v1/dashboard/sessions", &admin).await;
    stats.assert_ok();
    let json: Value = stats.json();
    assert_eq!(json["stats"]["activeSessions"], 1);

    app.post_with_token("/api/v1/auth/logout", &token)
        .await
        .assert_ok();
    let response = app.get_with_token("/api/v1/auth/me", &token).await;
    response.assert_unauthorized();
    assert_eq!(response.code(), "SESSION_MISSING");
}
