//! Authentication pipeline integration tests
//!
//! Drive requests through the router against a [`MockSessionStore`] to
//! observe how each strategy uses the store and how the pipeline copes with
//! slow or failing backends.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;

use portal_gateway::{models::SessionProfile, services::SessionStore};

use crate::common::{test_config, IdentityFixtures, MockError, MockSessionStore, TestApp};

fn app_with_mock() -> (TestApp, Arc<MockSessionStore>) {
    let store = Arc::new(MockSessionStore::new());
    let app = TestApp::with_store(test_config(), store.clone());
    (app, store)
}

#[tokio::test]
async fn test_high_risk_path_never_touches_store() {
    let (app, store) = app_with_mock();
    let token = app.token_for(&IdentityFixtures::admin().with_session("any-session"));

    for _ in 0..5 {
        app.get_with_token("/api/v1/dashboard/sessions", &token)
            .await
            .assert_ok();
    }

    assert_eq!(store.calls.resolution_calls(), 0);
}

#[tokio::test]
async fn test_normal_path_checks_revocation_and_session() {
    let (app, store) = app_with_mock();
    let teacher = IdentityFixtures::teacher();
    let session_id = store.seed(&SessionProfile::from_claim(&teacher)).await;
    let token = app.token_for(&teacher.with_session(session_id));

    app.get_with_token("/api/v1/auth/me", &token)
        .await
        .assert_ok();

    assert_eq!(store.calls.is_blacklisted(), 1);
    assert_eq!(store.calls.validate(), 1);
    assert_eq!(store.calls.create(), 0);
}

#[tokio::test]
async fn test_missing_session_creates_exactly_once() {
    let (app, store) = app_with_mock();
    let token = app.token_for(&IdentityFixtures::teacher().with_session("expired-session"));

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_ok();
    assert_eq!(store.calls.create(), 1);
    let new_id = response.session_header().expect("X-Session-Id header");
    assert!(store.backing().validate(&new_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_session_of_other_user_is_replaced() {
    let (app, store) = app_with_mock();
    let foreign = store
        .seed(&SessionProfile::from_claim(&IdentityFixtures::student()))
        .await;
    let token = app.token_for(&IdentityFixtures::teacher().with_session(foreign.clone()));

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_ok();
    let new_id = response.session_header().expect("X-Session-Id header");
    assert_ne!(new_id, foreign);
    let json: Value = response.json();
    assert_eq!(json["user"]["id"], "42");
    assert_eq!(json["user"]["role"], "teacher");
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_degrades_instead_of_hanging() {
    let (app, store) = app_with_mock();
    store.set_error_mode(MockError::Timeout(Duration::from_secs(30)));
    let token = app.token_for(&IdentityFixtures::teacher().with_session("some-session"));

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["validation"], "degraded");
    assert_eq!(json["user"]["id"], "42");
    assert!(response.session_header().is_none());
}

#[tokio::test]
async fn test_failing_store_degrades() {
    let (app, store) = app_with_mock();
    store.set_error_mode(MockError::ConnectionRefused);
    let token = app.token_for(&IdentityFixtures::teacher().with_session("some-session"));

    let response = app.get_with_token("/api/v1/auth/me", &token).await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["validation"], "degraded");
    assert_eq!(json["user"]["sessionId"], "some-session");
}

#[tokio::test]
async fn test_failing_store_still_rejects_bad_credentials() {
    let (app, store) = app_with_mock();
    store.set_error_mode(MockError::InternalError("disk full".to_string()));

    let response = app
        .get_with_token("/api/v1/auth/me", "definitely-not-a-token")
        .await;

    response.assert_unauthorized();
    assert_eq!(response.code(), "MALFORMED_CREDENTIAL");
}

#[tokio::test]
async fn test_store_recovers_after_outage() {
    let (app, store) = app_with_mock();
    let teacher = IdentityFixtures::teacher();
    let session_id = store.seed(&SessionProfile::from_claim(&teacher)).await;
    let token = app.token_for(&teacher.with_session(session_id));

    store.set_error_mode(MockError::ConnectionRefused);
    let json: Value = app.get_with_token("/api/v1/auth/me", &token).await.json();
    assert_eq!(json["validation"], "degraded");

    store.clear_error_mode();
    let json: Value = app.get_with_token("/api/v1/auth/me", &token).await.json();
    assert_eq!(json["validation"], "full");
}

#[tokio::test]
async fn test_concurrent_requests_recover_one_session() {
    let (app, store) = app_with_mock();
    let token = app.token_for(&IdentityFixtures::teacher().with_session("lost-session"));

    let responses = join_all(
        (0..8).map(|_| app.get_with_token("/api/v1/auth/me", &token)),
    )
    .await;

    let mut ids: Vec<String> = responses
        .iter()
        .map(|r| {
            r.assert_ok();
            r.session_header().expect("X-Session-Id header")
        })
        .collect();
    ids.dedup();
    assert_eq!(ids.len(), 1, "recovered sessions: {:?}", ids);

    let stats = store.backing().stats().await.unwrap();
    assert_eq!(stats.active_sessions, 1);
}
