//! Portal Gateway - authentication front for the learning portal API
//!
//! Resolves the caller of every protected request from its bearer
//! credential and, on normal routes, from the backing server-side session.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use portal_gateway::{
    api_router, logging, models::IdentityClaim, services, AppConfig, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    // Check for --help flag
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    // Check for --version flag
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("Portal Gateway {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Check for --issue-token flag
    if let Some(pos) = args.iter().position(|arg| arg == "--issue-token") {
        return issue_token(&args[pos + 1..]);
    }

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guard must be kept alive for the duration of the program
    // to ensure log messages are flushed to files
    let _log_guard = logging::init(&config.logging);

    info!("Portal Gateway starting up");
    info!(
        environment = ?config.environment,
        backend = ?config.sessions.backend,
        store_timeout_ms = config.sessions.store_timeout_ms,
        "Configuration loaded successfully"
    );

    if config.auth.allow_missing_role {
        warn!("Identities without a role pass role checks (auth.allow_missing_role)");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let cleanup_interval = Duration::from_secs(config.sessions.cleanup_interval_secs.max(1));

    info!("Initializing session store");
    let state = AppState::new(config)
        .await
        .context("Failed to initialize session store")?;

    services::spawn_session_cleanup(state.sessions.clone(), cleanup_interval);

    let app = create_router(state);

    info!("Starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("HTTP server is ready to accept connections");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server error")?;

    Ok(())
}

/// Print a signed credential for local testing
///
/// Usage: `--issue-token <user-id> [role] [session-id]`
fn issue_token(args: &[String]) -> Result<()> {
    let Some(user_id) = args.first() else {
        anyhow::bail!("--issue-token requires a user id");
    };

    let config = AppConfig::load().context("Failed to load configuration")?;
    let codec = services::TokenCodec::new(&config.auth, config.environment);

    let mut claim = IdentityClaim::new(user_id.as_str());
    if let Some(role) = args.get(1) {
        claim = claim.with_role(role.as_str());
    }
    if let Some(session_id) = args.get(2) {
        claim = claim.with_session(session_id.as_str());
    }

    let ttl = chrono::Duration::minutes(config.auth.token_expiry_minutes as i64);
    let token = codec
        .issue(&claim, ttl)
        .context("Failed to sign credential")?;
    println!("{}", token);
    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([portal_gateway::middleware::SESSION_ID_HEADER]);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    api_router(state).layer(trace_layer).layer(cors)
}

/// Print help message
fn print_help() {
    println!(
        r#"Portal Gateway {}

USAGE:
    portal-gateway [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --issue-token <USER_ID> [ROLE] [SESSION_ID]
                            Print a signed access token using the configured
                            secret, issuer and audience, then exit.

ENVIRONMENT:
    PORTAL_CONFIG       Path to configuration file (default: config.yaml)
    PORTAL_ENV          development | production
    JWT_SECRET          Signing secret (at least 32 characters)
    SESSION_BACKEND     memory | sqlite

CONFIGURATION:
    The application looks for configuration files in the following order:
    1. Path specified by PORTAL_CONFIG environment variable
    2. ./config.yaml
    3. ./config/config.yaml
    4. /etc/portal-gateway/config.yaml"#,
        env!("CARGO_PKG_VERSION")
    );
}
