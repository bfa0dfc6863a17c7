//! Route risk classification

use serde::Serialize;

use crate::config::RiskConfig;

/// How strictly a route must be validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Polled dashboards, metrics and session administration
    High,
    Normal,
}

/// Classifies request paths against the configured high-risk fragments.
///
/// Built once at startup; classification is a pure, case-insensitive
/// substring match.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    patterns: Vec<String>,
}

impl RiskClassifier {
    pub fn new(config: &RiskConfig) -> Self {
        Self::from_patterns(&config.high_risk_paths)
    }

    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, path: &str) -> RiskLevel {
        let path = path.to_lowercase();
        if self.patterns.iter().any(|p| path.contains(p.as_str())) {
            RiskLevel::High
        } else {
            RiskLevel::Normal
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
