//! Bearer credential codec
//!
//! Two credential shapes share one entry point:
//! - signed tokens: three base64url segments, HS256, verified against the
//!   configured secret, issuer and audience
//! - legacy tokens: base64 (standard or URL-safe) JSON, accepted only outside
//!   production
//!
//! [`TokenCodec::decode_credential`] dispatches on the shape once and returns
//! a tagged [`DecodedCredential`].

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{AuthConfig, Environment};
use crate::models::{normalize_role, IdentityClaim};
use crate::utils::error::{AuthRejection, RejectionKind};

/// Credentials shorter than this are rejected without decoding
pub const MIN_CREDENTIAL_LEN: usize = 10;

/// Why a credential could not be turned into an identity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed credential: {0}")]
    Malformed(String),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("credential has expired")]
    Expired,

    /// Legacy credentials are refused in production regardless of content
    #[error("legacy credentials are not accepted in production")]
    LegacyDisabled,
}

impl DecodeError {
    pub fn kind(&self) -> RejectionKind {
        match self {
            DecodeError::Malformed(_) | DecodeError::LegacyDisabled => {
                RejectionKind::MalformedCredential
            }
            DecodeError::InvalidSignature => RejectionKind::InvalidSignature,
            DecodeError::Expired => RejectionKind::Expired,
        }
    }

    fn malformed(reason: impl Into<String>) -> Self {
        DecodeError::Malformed(reason.into())
    }
}

impl From<DecodeError> for AuthRejection {
    fn from(err: DecodeError) -> Self {
        let rejection = AuthRejection::new(err.kind());
        match err {
            DecodeError::LegacyDisabled => {
                rejection.with_message("Legacy access tokens are not accepted")
            }
            _ => rejection,
        }
    }
}

/// Structural shape of a raw credential, decided before any decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialShape {
    Signed,
    Legacy,
}

impl CredentialShape {
    pub fn of(credential: &str) -> Self {
        if credential.split('.').count() == 3 {
            CredentialShape::Signed
        } else {
            CredentialShape::Legacy
        }
    }
}

/// Successfully decoded credential, tagged by shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedCredential {
    Signed(IdentityClaim),
    Legacy(IdentityClaim),
}

impl DecodedCredential {
    pub fn shape(&self) -> CredentialShape {
        match self {
            DecodedCredential::Signed(_) => CredentialShape::Signed,
            DecodedCredential::Legacy(_) => CredentialShape::Legacy,
        }
    }

    pub fn claim(&self) -> &IdentityClaim {
        match self {
            DecodedCredential::Signed(claim) | DecodedCredential::Legacy(claim) => claim,
        }
    }

    pub fn into_claim(self) -> IdentityClaim {
        match self {
            DecodedCredential::Signed(claim) | DecodedCredential::Legacy(claim) => claim,
        }
    }
}

/// Payload carried by a signed token
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedPayload {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    permissions: Option<Vec<String>>,
    #[serde(default)]
    institution_id: Option<Value>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
}

impl SignedPayload {
    fn into_claim(self) -> Result<IdentityClaim, DecodeError> {
        let id = identifier(self.id.as_ref())
            .or_else(|| identifier(self.user_id.as_ref()))
            .ok_or_else(|| DecodeError::malformed("token carries no id or userId"))?;

        Ok(IdentityClaim {
            id,
            email: self.email.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            role: normalize_role(self.role),
            permissions: self.permissions.unwrap_or_default(),
            institution_id: identifier(self.institution_id.as_ref()),
            session_id: self.session_id.filter(|s| !s.is_empty()),
            issued_at: self.iat,
            expires_at: self.exp,
        })
    }
}

/// Payload carried by a legacy token
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyPayload {
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    permissions: Option<Vec<String>>,
    #[serde(default)]
    institution_id: Option<Value>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
}

impl LegacyPayload {
    fn into_claim(self, now: i64) -> Result<IdentityClaim, DecodeError> {
        let id = identifier(self.user_id.as_ref())
            .ok_or_else(|| DecodeError::malformed("legacy token missing userId"))?;
        let email = self
            .email
            .ok_or_else(|| DecodeError::malformed("legacy token missing email"))?;
        let role = self
            .role
            .ok_or_else(|| DecodeError::malformed("legacy token missing role"))?;

        if matches!(self.exp, Some(exp) if exp < now) {
            return Err(DecodeError::Expired);
        }

        Ok(IdentityClaim {
            id,
            email,
            name: self.name.unwrap_or_default(),
            role: normalize_role(Some(role)),
            permissions: self.permissions.unwrap_or_default(),
            institution_id: identifier(self.institution_id.as_ref()),
            session_id: self.session_id.filter(|s| !s.is_empty()),
            issued_at: self.iat,
            expires_at: self.exp,
        })
    }
}

/// Payload written by [`TokenCodec::issue`]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IssuedPayload<'a> {
    id: &'a str,
    user_id: &'a str,
    email: &'a str,
    name: &'a str,
    role: &'a str,
    permissions: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    institution_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aud: Option<&'a str>,
}

/// Identifiers may arrive as strings or numbers
fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode standard or URL-safe base64, with or without padding.
///
/// The alphabet is checked up front so that a bad character is reported as a
/// malformed credential rather than surfacing from the decoder.
fn decode_base64_lenient(input: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = input.trim_end_matches('=');
    let valid = trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'-' | b'_'));
    if !valid || trimmed.is_empty() {
        return Err(DecodeError::malformed("invalid base64 alphabet"));
    }
    if trimmed.len() % 4 == 1 {
        return Err(DecodeError::malformed("invalid base64 length"));
    }

    let mut normalized: String = trimmed
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }

    STANDARD
        .decode(normalized)
        .map_err(|e| DecodeError::malformed(format!("invalid base64: {}", e)))
}

/// Verifies and decodes bearer credentials
#[derive(Clone)]
pub struct TokenCodec {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
    issuer: Option<String>,
    audience: Option<String>,
    allow_legacy: bool,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig, environment: Environment) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        validation.validate_exp = true;
        // `exp` is optional; it is enforced only when present
        validation.required_spec_claims = HashSet::new();
        if let Some(issuer) = config.issuer.as_deref() {
            validation.set_issuer(&[issuer]);
        }
        match config.audience.as_deref() {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            allow_legacy: !environment.is_production(),
        }
    }

    /// Decode a credential into a normalized identity
    pub fn decode(&self, credential: &str) -> Result<IdentityClaim, DecodeError> {
        self.decode_credential(credential)
            .map(DecodedCredential::into_claim)
    }

    /// Decode a credential, keeping track of which shape it had
    pub fn decode_credential(&self, credential: &str) -> Result<DecodedCredential, DecodeError> {
        if credential.len() < MIN_CREDENTIAL_LEN {
            return Err(DecodeError::malformed("credential too short"));
        }

        match CredentialShape::of(credential) {
            CredentialShape::Signed => self.decode_signed(credential).map(DecodedCredential::Signed),
            CredentialShape::Legacy if !self.allow_legacy => Err(DecodeError::LegacyDisabled),
            CredentialShape::Legacy => self.decode_legacy(credential).map(DecodedCredential::Legacy),
        }
    }

    fn decode_signed(&self, credential: &str) -> Result<IdentityClaim, DecodeError> {
        let data = decode::<SignedPayload>(credential, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => DecodeError::Expired,
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAudience
                | ErrorKind::ImmatureSignature
                | ErrorKind::InvalidAlgorithm => DecodeError::InvalidSignature,
                _ => DecodeError::malformed(e.to_string()),
            })?;

        data.claims.into_claim()
    }

    fn decode_legacy(&self, credential: &str) -> Result<IdentityClaim, DecodeError> {
        let bytes = decode_base64_lenient(credential)?;
        if bytes.contains(&0) {
            return Err(DecodeError::malformed("payload contains NUL bytes"));
        }

        let payload: LegacyPayload = serde_json::from_slice(&bytes)
            .map_err(|e| DecodeError::malformed(format!("invalid legacy payload: {}", e)))?;

        payload.into_claim(Utc::now().timestamp())
    }

    /// Sign a token for `claim`, valid for `ttl` from now.
    ///
    /// A negative `ttl` produces an already expired token.
    pub fn issue(
        &self,
        claim: &IdentityClaim,
        ttl: chrono::Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let payload = IssuedPayload {
            id: &claim.id,
            user_id: &claim.id,
            email: &claim.email,
            name: &claim.name,
            role: claim.role().unwrap_or_default(),
            permissions: &claim.permissions,
            institution_id: claim.institution_id.as_deref(),
            session_id: claim.session_id.as_deref(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.issuer.as_deref(),
            aud: self.audience.as_deref(),
        };

        encode(&Header::new(Algorithm::HS256), &payload, &self.encoding_key)
    }
}
