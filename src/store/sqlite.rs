//! SQLite-backed [`LicenseStore`].

use super::schema::init_db;
use super::{LicenseStore, UserRecord, UserUpdate, ValidationLogEntry};
use crate::clock::Clock;
use crate::crypto::digest::key_fingerprint;
use crate::meter::usage::{BotStats, Period, UsageSummary};
use crate::protocol::models::{LicenseRecord, LicenseStatus, OwnerClaim};
use crate::BotError;
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::{self, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::sync::Arc;

const LICENSE_COLUMNS: &str = "l.license_key, l.status, l.plan, l.expires_at, l.application, u.discord_id";

fn db_err(err: sqlx::Error) -> BotError {
    tracing::warn!("DB: {:#?}", err);
    BotError::StoreUnavailable(err.to_string())
}

fn user_from_row(row: &SqliteRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        identity: row.try_get("discord_id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn license_from_row(row: &SqliteRow) -> Result<LicenseRecord, sqlx::Error> {
    let identity: String = row.try_get("discord_id")?;
    let status: String = row.try_get("status")?;
    let expires_at: Option<i64> = row.try_get("expires_at")?;
    Ok(LicenseRecord {
        id: None,
        key: row.try_get("license_key")?,
        status: LicenseStatus::parse(&status),
        plan_name: row.try_get("plan")?,
        expires_at: expires_at.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        owner: Some(identity.clone()),
        owner_claims: vec![OwnerClaim {
            field: "discordId".to_string(),
            value: identity,
        }],
        application: row.try_get("application")?,
    })
}

/// SQLite store with a small connection pool.
pub struct SqliteStore {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and initialize the
    /// schema.
    pub async fn connect(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, BotError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                BotError::StoreUnavailable(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let opts = sqlite::SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlite::SqliteJournalMode::Wal);
        let db = sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(db_err)?;

        init_db(&db).await.map_err(db_err)?;
        tracing::info!(path = %path.display(), "database connected");

        Ok(Self { db, clock })
    }

    async fn validations_since(
        &self,
        identity: &str,
        since: i64,
    ) -> Result<Vec<ValidationLogEntry>, BotError> {
        let rows = sqlx::query(
            "SELECT v.license_key, v.is_valid, v.created_at FROM validations v
             JOIN users u ON u.id = v.user_id
             WHERE u.discord_id = ?1 AND v.created_at >= ?2
             ORDER BY v.id",
        )
        .bind(identity)
        .bind(since)
        .fetch_all(&self.db)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let created_at: i64 = row.try_get("created_at")?;
                Ok(ValidationLogEntry {
                    identity: identity.to_string(),
                    license_key: row.try_get("license_key")?,
                    succeeded: row.try_get::<i64, _>("is_valid")? != 0,
                    timestamp: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(db_err)
    }
}

#[async_trait]
impl LicenseStore for SqliteStore {
    async fn get_user(&self, identity: &str) -> Result<Option<UserRecord>, BotError> {
        let row = sqlx::query(
            "SELECT id, discord_id, username, email, created_at, updated_at FROM users WHERE discord_id = ?1",
        )
        .bind(identity)
        .fetch_optional(&self.db)
        .await
        .map_err(db_err)?;

        row.as_ref().map(user_from_row).transpose().map_err(db_err)
    }

    async fn get_or_create_user(
        &self,
        identity: &str,
        username: Option<&str>,
    ) -> Result<UserRecord, BotError> {
        let now = self.clock.unix_seconds();
        sqlx::query(
            "INSERT INTO users (discord_id, username, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(discord_id) DO NOTHING",
        )
        .bind(identity)
        .bind(username)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(db_err)?;

        self.get_user(identity).await?.ok_or_else(|| {
            BotError::StoreUnavailable(format!("user row for {} vanished after insert", identity))
        })
    }

    async fn update_user(
        &self,
        identity: &str,
        update: &UserUpdate,
    ) -> Result<UserRecord, BotError> {
        self.get_or_create_user(identity, None).await?;
        sqlx::query(
            "UPDATE users SET username = COALESCE(?2, username), email = COALESCE(?3, email), updated_at = ?4
             WHERE discord_id = ?1",
        )
        .bind(identity)
        .bind(update.username.as_deref())
        .bind(update.email.as_deref())
        .bind(self.clock.unix_seconds())
        .execute(&self.db)
        .await
        .map_err(db_err)?;

        self.get_user(identity).await?.ok_or_else(|| {
            BotError::StoreUnavailable(format!("user row for {} vanished after update", identity))
        })
    }

    async fn get_user_licenses(&self, identity: &str) -> Result<Vec<LicenseRecord>, BotError> {
        let sql = format!(
            "SELECT {} FROM licenses l JOIN users u ON u.id = l.user_id
             WHERE u.discord_id = ?1 ORDER BY l.created_at DESC, l.id DESC",
            LICENSE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(identity)
            .fetch_all(&self.db)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(license_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    async fn find_license(&self, key: &str) -> Result<Option<LicenseRecord>, BotError> {
        let sql = format!(
            "SELECT {} FROM licenses l JOIN users u ON u.id = l.user_id WHERE l.license_key = ?1",
            LICENSE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .map_err(db_err)?;

        row.as_ref().map(license_from_row).transpose().map_err(db_err)
    }

    async fn upsert_license(
        &self,
        identity: &str,
        license: &LicenseRecord,
    ) -> Result<(), BotError> {
        let user = self.get_or_create_user(identity, None).await?;
        sqlx::query(
            "INSERT INTO licenses (user_id, license_key, status, plan, expires_at, application, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(license_key) DO UPDATE SET
                user_id = excluded.user_id,
                status = excluded.status,
                plan = excluded.plan,
                expires_at = excluded.expires_at,
                application = excluded.application,
                updated_at = excluded.updated_at",
        )
        .bind(user.id)
        .bind(&license.key)
        .bind(license.status.as_str())
        .bind(&license.plan_name)
        .bind(license.expires_at.map(|t| t.timestamp()))
        .bind(license.application.as_deref())
        .bind(self.clock.unix_seconds())
        .execute(&self.db)
        .await
        .map_err(db_err)?;

        tracing::debug!(key_fingerprint = %key_fingerprint(&license.key), "license cached");
        Ok(())
    }

    async fn set_license_status(
        &self,
        key: &str,
        status: LicenseStatus,
    ) -> Result<bool, BotError> {
        let res = sqlx::query("UPDATE licenses SET status = ?2, updated_at = ?3 WHERE license_key = ?1")
            .bind(key)
            .bind(status.as_str())
            .bind(self.clock.unix_seconds())
            .execute(&self.db)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn log_validation(
        &self,
        identity: &str,
        key: &str,
        succeeded: bool,
    ) -> Result<(), BotError> {
        let user = self.get_or_create_user(identity, None).await?;
        sqlx::query(
            "INSERT INTO validations (user_id, license_key, is_valid, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user.id)
        .bind(key)
        .bind(succeeded as i64)
        .bind(self.clock.unix_seconds())
        .execute(&self.db)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn log_command(&self, identity: &str, command: &str) -> Result<(), BotError> {
        let user = self.get_or_create_user(identity, None).await?;
        sqlx::query("INSERT INTO commands (user_id, command, executed_at) VALUES (?1, ?2, ?3)")
            .bind(user.id)
            .bind(command)
            .bind(self.clock.unix_seconds())
            .execute(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_usage_stats(
        &self,
        identity: &str,
        period: Period,
    ) -> Result<UsageSummary, BotError> {
        let since = period.window_start(self.clock.now_utc()).timestamp();
        let entries = self.validations_since(identity, since).await?;
        Ok(UsageSummary::tally(
            period,
            entries.iter().map(|e| (e.license_key.as_str(), e.succeeded)),
        ))
    }

    async fn get_bot_stats(&self) -> Result<BotStats, BotError> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM licenses) AS licenses,
                (SELECT COUNT(*) FROM commands) AS commands,
                (SELECT COUNT(*) FROM validations) AS validations",
        )
        .fetch_one(&self.db)
        .await
        .map_err(db_err)?;

        let count = |name: &str| -> Result<u64, BotError> {
            row.try_get::<i64, _>(name).map(|n| n.max(0) as u64).map_err(db_err)
        };
        Ok(BotStats {
            total_users: count("users")?,
            total_licenses: count("licenses")?,
            total_commands: count("commands")?,
            total_validations: count("validations")?,
        })
    }

    async fn close(&self) {
        self.db.close().await;
        tracing::info!("database closed");
    }
}
