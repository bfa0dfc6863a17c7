//! SQLite-backed session store
//!
//! Persists sessions and revoked credential fingerprints so they survive
//! restarts and can be shared by several processes on one host.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::session::{token_fingerprint, SessionStore, SessionTtl, StoreError};
use crate::db::DbPool;
use crate::models::{ClientInfo, SessionHandle, SessionProfile, SessionRecord, SessionStats};

const SESSION_COLUMNS: &str = "session_id, user_id, email, name, role, institution_id, \
     permissions, ip_address, user_agent, device_type, created_at, last_activity, expires_at, remember";

/// Timestamps are stored as fixed-width RFC 3339 so they compare lexically
fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_db_timestamp(ts: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp {:?}: {}", ts, e)))
}

fn row_to_record(row: &SqliteRow) -> Result<SessionRecord, StoreError> {
    let permissions: String = row.try_get("permissions")?;
    let device_type: String = row.try_get("device_type")?;
    let created_at: String = row.try_get("created_at")?;
    let last_activity: String = row.try_get("last_activity")?;
    let expires_at: String = row.try_get("expires_at")?;

    Ok(SessionRecord {
        session_id: row.try_get("session_id")?,
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        institution_id: row.try_get("institution_id")?,
        permissions: serde_json::from_str(&permissions)?,
        client: ClientInfo {
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            device_type: device_type.parse().unwrap_or_default(),
        },
        created_at: parse_db_timestamp(&created_at)?,
        last_activity: parse_db_timestamp(&last_activity)?,
        expires_at: parse_db_timestamp(&expires_at)?,
        remember: row.try_get("remember")?,
    })
}

/// Session store persisted in SQLite
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: DbPool,
    ttl: SessionTtl,
}

impl SqliteSessionStore {
    pub fn new(pool: DbPool, ttl: SessionTtl) -> Self {
        info!("Using SQLite session store");
        Self { pool, ttl }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn is_blacklisted(&self, token: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM revoked_tokens WHERE fingerprint = ? AND expires_at > ?",
        )
        .bind(token_fingerprint(token))
        .bind(to_db_timestamp(Utc::now()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn validate(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let now = Utc::now();
        let standard = chrono::Duration::from_std(self.ttl.standard)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let remember = chrono::Duration::from_std(self.ttl.remember)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let now_str = to_db_timestamp(now);

        let sql = format!(
            "UPDATE sessions SET last_activity = ?, \
             expires_at = CASE WHEN remember THEN ? ELSE ? END \
             WHERE session_id = ? AND expires_at > ? \
             RETURNING {}",
            SESSION_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(&now_str)
            .bind(to_db_timestamp(now + remember))
            .bind(to_db_timestamp(now + standard))
            .bind(session_id)
            .bind(&now_str)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn create(
        &self,
        profile: &SessionProfile,
        client: &ClientInfo,
        remember: bool,
    ) -> Result<SessionHandle, StoreError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl.for_remember(remember))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let session_id = Uuid::new_v4().to_string();
        let now_str = to_db_timestamp(now);
        let permissions = serde_json::to_string(&profile.permissions)?;

        let mut tx = self.pool.begin().await?;

        // An expired session must not block a fresh recovery under its key
        if let Some(key) = profile.recovery_key.as_deref() {
            sqlx::query("DELETE FROM sessions WHERE recovery_key = ? AND expires_at <= ?")
                .bind(key)
                .bind(&now_str)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, user_id, email, name, role, institution_id, permissions,
                ip_address, user_agent, device_type, recovery_key,
                created_at, last_activity, expires_at, remember
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(recovery_key) DO NOTHING
            "#,
        )
        .bind(&session_id)
        .bind(&profile.user_id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.role)
        .bind(&profile.institution_id)
        .bind(&permissions)
        .bind(&client.ip_address)
        .bind(&client.user_agent)
        .bind(client.device_type.as_str())
        .bind(&profile.recovery_key)
        .bind(&now_str)
        .bind(&now_str)
        .bind(to_db_timestamp(now + ttl))
        .bind(remember)
        .execute(&mut *tx)
        .await?;

        let stored_id = match profile.recovery_key.as_deref() {
            Some(key) => {
                sqlx::query("SELECT session_id FROM sessions WHERE recovery_key = ?")
                    .bind(key)
                    .fetch_one(&mut *tx)
                    .await?
                    .try_get::<String, _>("session_id")?
            }
            None => session_id.clone(),
        };

        tx.commit().await?;

        let created = stored_id == session_id;
        if !created {
            debug!(session_id = %stored_id, "Reusing recovered session");
        }

        Ok(SessionHandle {
            session_id: stored_id,
            created,
        })
    }

    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Ok(());
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (fingerprint, expires_at) VALUES (?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET expires_at = excluded.expires_at
            "#,
        )
        .bind(token_fingerprint(token))
        .bind(to_db_timestamp(Utc::now() + ttl))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<SessionStats, StoreError> {
        let now = to_db_timestamp(Utc::now());

        let totals = sqlx::query(
            "SELECT COUNT(*) AS sessions, COUNT(DISTINCT user_id) AS users \
             FROM sessions WHERE expires_at > ?",
        )
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        let devices = sqlx::query(
            "SELECT device_type, COUNT(*) AS total FROM sessions \
             WHERE expires_at > ? GROUP BY device_type",
        )
        .bind(&now)
        .fetch_all(&self.pool)
        .await?;

        let revoked = sqlx::query("SELECT COUNT(*) AS total FROM revoked_tokens WHERE expires_at > ?")
            .bind(&now)
            .fetch_one(&self.pool)
            .await?;

        let mut stats = SessionStats {
            active_sessions: totals.try_get::<i64, _>("sessions")? as usize,
            active_users: totals.try_get::<i64, _>("users")? as usize,
            revoked_tokens: revoked.try_get::<i64, _>("total")? as usize,
            ..SessionStats::default()
        };
        for row in devices {
            let device: String = row.try_get("device_type")?;
            let total: i64 = row.try_get("total")?;
            stats.sessions_by_device.insert(device, total as usize);
        }

        Ok(stats)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = to_db_timestamp(Utc::now());

        let sessions = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        let revoked = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?")
            .bind(&now)
            .execute(&self.pool)
            .await?;

        Ok((sessions.rows_affected() + revoked.rows_affected()) as usize)
    }
}
