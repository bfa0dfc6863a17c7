//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings
//!
//! The resulting [`AppConfig`] is built once at startup and shared read-only
//! with every component that needs it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "test" => Ok(Environment::Development),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

/// Credential verification and authorization settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HS256 signing secret shared by every signed credential
    pub jwt_secret: String,
    /// Expected `iss` claim (not checked when unset)
    #[serde(default)]
    pub issuer: Option<String>,
    /// Expected `aud` claim (not checked when unset)
    #[serde(default)]
    pub audience: Option<String>,
    /// Clock skew tolerated when checking `exp`
    #[serde(default)]
    pub leeway_secs: u64,
    /// Lifetime of credentials issued by this service
    #[serde(default = "default_token_expiry_minutes")]
    pub token_expiry_minutes: u64,
    /// Role that passes every role check
    #[serde(default = "default_privileged_role")]
    pub privileged_role: String,
    /// Let identities without any role through role checks (logged)
    #[serde(default = "default_true")]
    pub allow_missing_role: bool,
    /// Recreate a session when a valid credential references a missing one
    #[serde(default = "default_true")]
    pub recreate_missing_sessions: bool,
}

fn default_token_expiry_minutes() -> u64 {
    15
}

fn default_privileged_role() -> String {
    "system_admin".to_string()
}

fn default_true() -> bool {
    true
}

/// Session store backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Session store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub backend: SessionBackend,
    #[serde(default = "default_session_db_url")]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Deadline for a single session store stage
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
    /// Session lifetime when created with "remember me"
    #[serde(default = "default_remember_ttl")]
    pub remember_ttl_secs: u64,
    /// Capacity of the in-memory backend
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::default(),
            database_url: default_session_db_url(),
            max_connections: default_max_connections(),
            store_timeout_ms: default_store_timeout_ms(),
            ttl_secs: default_session_ttl(),
            remember_ttl_secs: default_remember_ttl(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_session_db_url() -> String {
    "sqlite://./data/sessions.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_store_timeout_ms() -> u64 {
    5000
}

fn default_session_ttl() -> u64 {
    15 * 60
}

fn default_remember_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_max_entries() -> usize {
    100_000
}

fn default_cleanup_interval() -> u64 {
    300
}

/// Route risk configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    /// Path fragments that mark a route as high-risk
    #[serde(default = "default_high_risk_paths")]
    pub high_risk_paths: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_risk_paths: default_high_risk_paths(),
        }
    }
}

fn default_high_risk_paths() -> Vec<String> {
    ["/dashboard", "/metrics", "/analytics", "/sessions", "/stats"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Log output target (console or file)
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_true")]
    pub daily_rotation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/portal-gateway")
}

fn default_log_prefix() -> String {
    "portal-gateway".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to console (stdout/stderr) - default for development
    #[default]
    Console,
    /// Log to file with optional rotation
    File,
    /// Log to both console and file
    Both,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            server: ServerConfig::default(),
            auth: AuthConfig {
                jwt_secret: "change-me-in-production-minimum-32-characters-long".to_string(),
                issuer: None,
                audience: None,
                leeway_secs: 0,
                token_expiry_minutes: default_token_expiry_minutes(),
                privileged_role: default_privileged_role(),
                allow_missing_role: true,
                recreate_missing_sessions: true,
            },
            sessions: SessionConfig::default(),
            risk: RiskConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("PORTAL_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                Self::from_file(path)?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse a YAML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/portal-gateway/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("portal-gateway/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(env) = std::env::var("PORTAL_ENV") {
            if let Ok(parsed) = env.parse() {
                self.environment = parsed;
            }
        }

        // Server overrides
        if let Ok(host) = std::env::var("PORTAL_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PORTAL_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        // Auth overrides
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            self.auth.issuer = Some(issuer).filter(|s| !s.is_empty());
        }
        if let Ok(audience) = std::env::var("JWT_AUDIENCE") {
            self.auth.audience = Some(audience).filter(|s| !s.is_empty());
        }
        if let Ok(allow) = std::env::var("AUTH_ALLOW_MISSING_ROLE") {
            self.auth.allow_missing_role = allow.to_lowercase() == "true";
        }

        // Session store overrides
        if let Ok(backend) = std::env::var("SESSION_BACKEND") {
            self.sessions.backend = match backend.to_lowercase().as_str() {
                "sqlite" => SessionBackend::Sqlite,
                _ => SessionBackend::Memory,
            };
        }
        if let Ok(url) = std::env::var("SESSION_DATABASE_URL") {
            self.sessions.database_url = url;
        }
        if let Ok(timeout) = std::env::var("SESSION_STORE_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.sessions.store_timeout_ms = ms;
            }
        }

        // Risk overrides (comma separated)
        if let Ok(paths) = std::env::var("PORTAL_HIGH_RISK_PATHS") {
            self.risk.high_risk_paths = paths
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }

        // Logging overrides
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PORTAL_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
        if let Ok(target) = std::env::var("PORTAL_LOG_TARGET") {
            self.logging.target = match target.to_lowercase().as_str() {
                "file" => LogTarget::File,
                "both" => LogTarget::Both,
                _ => LogTarget::Console,
            };
        }
        if let Ok(dir) = std::env::var("PORTAL_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("JWT secret must be at least 32 characters long");
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.sessions.store_timeout_ms == 0 {
            anyhow::bail!("Session store timeout must be greater than 0");
        }

        if self.sessions.ttl_secs == 0 {
            anyhow::bail!("Session TTL must be greater than 0");
        }

        if self.sessions.backend == SessionBackend::Sqlite && self.sessions.database_url.is_empty()
        {
            anyhow::bail!("Session database URL cannot be empty with the sqlite backend");
        }

        if self.risk.high_risk_paths.iter().any(|p| p.trim().is_empty()) {
            anyhow::bail!("High-risk path entries cannot be empty");
        }

        if self.environment.is_production() && self.auth.jwt_secret.starts_with("change-me") {
            tracing::warn!("Running in production with the default JWT secret");
        }

        Ok(())
    }
}
