//! Request authentication pipeline
//!
//! Resolves the caller of a request in one of two strategies, chosen per
//! request by the [`RiskClassifier`]:
//!
//! - **full**: revocation check, credential decode, then session lookup.
//!   The store's profile fields are merged over the claim, and a missing
//!   session is recreated.
//! - **simple**: credential decode only. High-risk routes (polled dashboards,
//!   metrics) use it so they never touch the session store.
//!
//! The revocation check, session lookup and session recreation each run
//! under the [`TimeoutGuard`]. A slow or failing store degrades the request
//! to the simple result instead of rejecting it.

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use super::risk::{RiskClassifier, RiskLevel};
use super::session::{SessionStore, StoreError};
use super::timeout::TimeoutGuard;
use super::token::TokenCodec;
use crate::config::AppConfig;
use crate::models::{ClientInfo, IdentityClaim, SessionProfile};
use crate::utils::error::{AuthRejection, RejectionKind};

/// Validation strategy applied to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Full,
    Simple,
}

impl From<RiskLevel> for Strategy {
    fn from(level: RiskLevel) -> Self {
        match level {
            RiskLevel::High => Strategy::Simple,
            RiskLevel::Normal => Strategy::Full,
        }
    }
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Full => "full",
            Strategy::Simple => "simple",
        }
    }
}

/// How the attached identity was actually validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Credential and session both checked
    Full,
    /// Credential only, by choice of strategy
    Simple,
    /// Credential only, because the session store was slow or failing
    Degraded,
}

/// Successful outcome of the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub claim: IdentityClaim,
    pub strategy: Strategy,
    pub mode: ValidationMode,
    /// Id of the session that replaced a missing one
    pub recreated_session: Option<String>,
}

impl Resolution {
    fn new(claim: IdentityClaim, strategy: Strategy, mode: ValidationMode) -> Self {
        Self {
            claim,
            strategy,
            mode,
            recreated_session: None,
        }
    }
}

/// The simple-strategy result standing in for an unreliable store
fn degraded_resolution(claim: IdentityClaim) -> Resolution {
    Resolution::new(claim, Strategy::Full, ValidationMode::Degraded)
}

/// Pull the bearer credential out of the `Authorization` header
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthRejection> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AuthRejection::new(RejectionKind::NoCredential))?
        .to_str()
        .map_err(|_| AuthRejection::new(RejectionKind::MalformedCredential))?;

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthRejection::new(RejectionKind::NoCredential));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthRejection::new(RejectionKind::MalformedCredential)
            .with_message("Bearer credential is empty"));
    }
    Ok(token)
}

pub struct AuthPipeline {
    codec: TokenCodec,
    classifier: RiskClassifier,
    store: Arc<dyn SessionStore>,
    guard: TimeoutGuard,
    recreate_missing: bool,
    expose_debug: bool,
}

impl AuthPipeline {
    pub fn new(config: &AppConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            codec: TokenCodec::new(&config.auth, config.environment),
            classifier: RiskClassifier::new(&config.risk),
            store,
            guard: TimeoutGuard::from(&config.sessions),
            recreate_missing: config.auth.recreate_missing_sessions,
            expose_debug: !config.environment.is_production(),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn strategy_for(&self, path: &str) -> Strategy {
        self.classifier.classify(path).into()
    }

    /// Resolve the caller of a request to `path`
    pub async fn resolve(&self, path: &str, headers: &HeaderMap) -> Result<Resolution, AuthRejection> {
        let credential = extract_bearer(headers)?;
        let strategy = self.strategy_for(path);
        debug!(path, strategy = strategy.as_str(), "Resolving request identity");

        let result = match strategy {
            Strategy::Simple => self.resolve_simple(credential),
            Strategy::Full => {
                self.resolve_full(credential, &ClientInfo::from_headers(headers))
                    .await
            }
        };

        if let Err(rejection) = &result {
            debug!(path, kind = %rejection.kind, "Request rejected");
        }
        result
    }

    /// Decode only; the session store is never consulted
    pub fn resolve_simple(&self, credential: &str) -> Result<Resolution, AuthRejection> {
        let claim = self.decode(credential, Strategy::Simple)?;
        Ok(Resolution::new(claim, Strategy::Simple, ValidationMode::Simple))
    }

    /// Revocation check, decode, then session resolution
    pub async fn resolve_full(
        &self,
        credential: &str,
        client: &ClientInfo,
    ) -> Result<Resolution, AuthRejection> {
        let mut degraded = false;

        match self
            .guard
            .run("blacklist check", self.store.is_blacklisted(credential))
            .await
        {
            Ok(Ok(true)) => {
                return Err(self.rejection(
                    RejectionKind::SessionMissing,
                    "Access token has been revoked",
                    json!({ "stage": "blacklist" }),
                ));
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Revocation check failed, continuing degraded");
                degraded = true;
            }
            Err(timeout) => {
                warn!(error = %timeout, "Revocation check timed out, continuing degraded");
                degraded = true;
            }
        }

        let claim = self.decode(credential, Strategy::Full)?;
        let mode = if degraded {
            ValidationMode::Degraded
        } else {
            ValidationMode::Full
        };

        let Some(session_id) = claim.session_id.clone() else {
            return Ok(Resolution::new(claim, Strategy::Full, mode));
        };

        let fallback = claim.clone();
        let guarded = self
            .guard
            .wrap(
                "session validate",
                self.resolve_session(claim, &session_id, client, mode),
                move || Ok(degraded_resolution(fallback)),
            )
            .await;
        if guarded.degraded {
            warn!(session_id = %session_id, "Session lookup timed out, degrading to token validation");
        }
        guarded.value
    }

    /// Look up the session named by the claim, merging or recreating it
    async fn resolve_session(
        &self,
        claim: IdentityClaim,
        session_id: &str,
        client: &ClientInfo,
        mode: ValidationMode,
    ) -> Result<Resolution, AuthRejection> {
        let record = match self.store.validate(session_id).await {
            Ok(record) => record,
            Err(e) => return Ok(self.degrade(claim, &e)),
        };

        match record {
            Some(record) if record.user_id == claim.id => {
                let mut claim = claim;
                claim.merge_session(&record);
                Ok(Resolution::new(claim, Strategy::Full, mode))
            }
            Some(record) => {
                warn!(
                    user_id = %claim.id,
                    session_user = %record.user_id,
                    session_id = %session_id,
                    "Session belongs to another user, treating as missing"
                );
                self.recreate(claim, session_id, client, mode).await
            }
            None => self.recreate(claim, session_id, client, mode).await,
        }
    }

    async fn recreate(
        &self,
        claim: IdentityClaim,
        missing_id: &str,
        client: &ClientInfo,
        mode: ValidationMode,
    ) -> Result<Resolution, AuthRejection> {
        if !self.recreate_missing {
            return Err(self.rejection(
                RejectionKind::SessionMissing,
                RejectionKind::SessionMissing.default_message(),
                json!({ "sessionId": missing_id }),
            ));
        }

        let fallback = claim.clone();
        let guarded = self
            .guard
            .wrap(
                "session create",
                self.create_session(claim, missing_id, client, mode),
                move || Ok(degraded_resolution(fallback)),
            )
            .await;
        if guarded.degraded {
            warn!(missing = %missing_id, "Session recreation timed out, degrading to token validation");
        }
        guarded.value
    }

    async fn create_session(
        &self,
        claim: IdentityClaim,
        missing_id: &str,
        client: &ClientInfo,
        mode: ValidationMode,
    ) -> Result<Resolution, AuthRejection> {
        let profile = SessionProfile::from_claim(&claim).recovering(missing_id);
        let handle = match self.store.create(&profile, client, false).await {
            Ok(handle) => handle,
            Err(e) => return Ok(self.degrade(claim, &e)),
        };

        debug!(
            user_id = %claim.id,
            missing = %missing_id,
            session_id = %handle.session_id,
            created = handle.created,
            "Recreated missing session"
        );

        let mut claim = claim;
        claim.session_id = Some(handle.session_id.clone());
        Ok(Resolution {
            claim,
            strategy: Strategy::Full,
            mode,
            recreated_session: Some(handle.session_id),
        })
    }

    /// The token-only result, substituted for a failing store
    fn degrade(&self, claim: IdentityClaim, error: &StoreError) -> Resolution {
        warn!(user_id = %claim.id, error = %error, "Session store unavailable, degrading to token validation");
        degraded_resolution(claim)
    }

    fn decode(&self, credential: &str, strategy: Strategy) -> Result<IdentityClaim, AuthRejection> {
        self.codec.decode(credential).map_err(|err| {
            let detail = json!({ "error": err.to_string(), "strategy": strategy });
            let rejection = AuthRejection::from(err);
            if self.expose_debug {
                rejection.with_debug(detail)
            } else {
                rejection
            }
        })
    }

    fn rejection(
        &self,
        kind: RejectionKind,
        message: &str,
        detail: serde_json::Value,
    ) -> AuthRejection {
        let rejection = AuthRejection::new(kind).with_message(message);
        if self.expose_debug {
            rejection.with_debug(detail)
        } else {
            rejection
        }
    }
}
