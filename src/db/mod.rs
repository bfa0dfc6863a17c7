//! Database layer
//!
//! SQLite connection handling for the persistent session store. Schema
//! migrations live in the `migrations/` directory and run on startup.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

/// Ensure the directory holding a file-backed database exists
pub fn ensure_data_directory(database_url: &str) -> Result<()> {
    let Some(path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
            tracing::info!("Created data directory: {:?}", parent);
        }
    }
    Ok(())
}

/// Initialize the database connection pool and run migrations
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    ensure_data_directory(database_url)?;

    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid session database URL: {}", database_url))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .context("Failed to connect to session database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run session database migrations")?;

    Ok(pool)
}
