//! Session models
//!
//! Records owned by the session store, plus the client metadata captured
//! when a session is created.

use std::collections::BTreeMap;

use axum::http::{header::USER_AGENT, HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::IdentityClaim;

/// Coarse device class derived from the user agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    #[default]
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Desktop => "desktop",
        }
    }

    /// Classify a user agent string
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        if ua.contains("ipad") || ua.contains("tablet") {
            DeviceType::Tablet
        } else if ua.contains("mobile")
            || ua.contains("android")
            || ua.contains("iphone")
        {
            DeviceType::Mobile
        } else {
            DeviceType::Desktop
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mobile" => Ok(DeviceType::Mobile),
            "tablet" => Ok(DeviceType::Tablet),
            "desktop" => Ok(DeviceType::Desktop),
            _ => Err(format!("Invalid device type: {}", s)),
        }
    }
}

/// Where a request came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: String,
    pub device_type: DeviceType,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            ip_address: "127.0.0.1".to_string(),
            user_agent: "Unknown".to_string(),
            device_type: DeviceType::Desktop,
        }
    }
}

impl ClientInfo {
    /// Extract client info from request headers
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .or_else(|| header("x-real-ip"))
            .or_else(|| header("x-remote-addr"))
            .unwrap_or("127.0.0.1")
            .to_string();

        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("Unknown")
            .to_string();

        Self {
            device_type: DeviceType::from_user_agent(&user_agent),
            ip_address,
            user_agent,
        }
    }
}

/// Active session as held by the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub institution_id: Option<String>,
    pub permissions: Vec<String>,
    pub client: ClientInfo,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Pushed forward by the session TTL on every validation
    pub expires_at: DateTime<Utc>,
    /// Created with "remember me"; slides by the longer TTL
    #[serde(default)]
    pub remember: bool,
}

impl SessionRecord {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Profile fields used to create a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub institution_id: Option<String>,
    pub permissions: Vec<String>,
    /// Logical key for create-if-missing recovery; creates sharing a key
    /// resolve to the same session
    pub recovery_key: Option<String>,
}

impl SessionProfile {
    /// Build a profile from a decoded claim
    pub fn from_claim(claim: &IdentityClaim) -> Self {
        Self {
            user_id: claim.id.clone(),
            email: claim.email.clone(),
            name: claim.name.clone(),
            role: claim.role().unwrap_or_default().to_string(),
            institution_id: claim.institution_id.clone(),
            permissions: claim.permissions.clone(),
            recovery_key: None,
        }
    }

    /// Key the profile to the session it replaces
    pub fn recovering(mut self, missing_session_id: &str) -> Self {
        self.recovery_key = Some(format!("{}:{}", self.user_id, missing_session_id));
        self
    }
}

/// Handle returned by session creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: String,
    /// `false` when an existing session was returned for the recovery key
    pub created: bool,
}

/// Aggregate session statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub active_sessions: usize,
    pub active_users: usize,
    pub sessions_by_device: BTreeMap<String, usize>,
    pub revoked_tokens: usize,
}
