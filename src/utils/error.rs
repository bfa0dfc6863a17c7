//! Error types and handling
//!
//! This module provides the error taxonomy shared by the authentication
//! pipeline and the request handlers. Every error is rendered with the same
//! JSON shape: `{ "success": false, "message", "code", ["debug"] }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::services::StoreError;

/// Why a request was refused by the authentication pipeline or role gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionKind {
    NoCredential,
    MalformedCredential,
    InvalidSignature,
    Expired,
    SessionMissing,
    InsufficientRole,
    /// Absorbed by the timeout guard; only surfaces if a caller opts out of
    /// degradation
    StoreTimeout,
}

impl RejectionKind {
    pub fn status(&self) -> StatusCode {
        match self {
            RejectionKind::InsufficientRole => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RejectionKind::NoCredential => "NO_CREDENTIAL",
            RejectionKind::MalformedCredential => "MALFORMED_CREDENTIAL",
            RejectionKind::InvalidSignature => "INVALID_SIGNATURE",
            RejectionKind::Expired => "EXPIRED",
            RejectionKind::SessionMissing => "SESSION_MISSING",
            RejectionKind::InsufficientRole => "INSUFFICIENT_ROLE",
            RejectionKind::StoreTimeout => "STORE_TIMEOUT",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            RejectionKind::NoCredential => "Access token required",
            RejectionKind::MalformedCredential => "Malformed access token",
            RejectionKind::InvalidSignature => "Invalid access token",
            RejectionKind::Expired => "Access token has expired",
            RejectionKind::SessionMissing => "Session is no longer valid",
            RejectionKind::InsufficientRole => "Insufficient permissions for this resource",
            RejectionKind::StoreTimeout => "Session store did not respond in time",
        }
    }
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A refused request, ready to be rendered at the HTTP boundary
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct AuthRejection {
    pub kind: RejectionKind,
    pub message: String,
    /// Diagnostic detail; only populated outside production
    pub debug: Option<serde_json::Value>,
}

impl AuthRejection {
    pub fn new(kind: RejectionKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            debug: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_debug(mut self, debug: serde_json::Value) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl From<RejectionKind> for AuthRejection {
    fn from(kind: RejectionKind) -> Self {
        Self::new(kind)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let mut body = ErrorResponse::new(self.message).with_code(self.kind.code());
        if let Some(debug) = self.debug {
            body = body.with_debug(debug);
        }
        (self.kind.status(), Json(body)).into_response()
    }
}

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Session store failure (503)
    #[error("Session store error: {0}")]
    Store(String),
}

/// Error response body
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    /// Human-readable error message
    pub message: String,
    /// Error code for programmatic handling (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Diagnostic details, never sent in production (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: None,
            debug: None,
        }
    }

    /// Add an error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add diagnostic details
    pub fn with_debug(mut self, debug: serde_json::Value) -> Self {
        self.debug = Some(debug);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, should_log) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", false),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", false),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", true),
            AppError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", true),
        };

        if should_log {
            error!(error = %self, code = code, "Request error");
        }

        let body = ErrorResponse::new(self.to_string()).with_code(code);

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err.to_string())
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
