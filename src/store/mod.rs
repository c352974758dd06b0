//! Local persistence beside the licensing API.
//!
//! The store caches user rows and license associations, and owns the
//! append-only validation log that usage statistics are computed from. It is
//! a supplementary source: handlers degrade when it fails instead of
//! aborting the command, except where it is the primary source
//! (`analytics usage`).

pub mod schema;
pub mod sqlite;
pub mod unavailable;

pub use sqlite::SqliteStore;
pub use unavailable::UnavailableStore;

use crate::meter::usage::{BotStats, Period, UsageSummary};
use crate::protocol::models::{LicenseRecord, LicenseStatus};
use crate::BotError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A locally known chat user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    /// Row id.
    pub id: i64,
    /// Chat platform identity.
    pub identity: String,
    /// Display name, if known.
    pub username: Option<String>,
    /// Email, if the user registered one.
    pub email: Option<String>,
    /// First seen, unix seconds.
    pub created_at: i64,
    /// Last modified, unix seconds.
    pub updated_at: i64,
}

/// Partial update of a [`UserRecord`]. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// One row of the validation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationLogEntry {
    pub identity: String,
    pub license_key: String,
    pub succeeded: bool,
    pub timestamp: DateTime<Utc>,
}

/// Storage operations used by handlers.
///
/// Every method may fail with `BotError::StoreUnavailable`.
#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// Look up a user without creating one.
    async fn get_user(&self, identity: &str) -> Result<Option<UserRecord>, BotError>;

    /// Fetch a user, inserting a row on first sight.
    async fn get_or_create_user(
        &self,
        identity: &str,
        username: Option<&str>,
    ) -> Result<UserRecord, BotError>;

    /// Apply a partial update, creating the user if needed.
    async fn update_user(&self, identity: &str, update: &UserUpdate)
        -> Result<UserRecord, BotError>;

    /// Licenses associated with a user, newest first.
    async fn get_user_licenses(&self, identity: &str) -> Result<Vec<LicenseRecord>, BotError>;

    /// A license by key.
    async fn find_license(&self, key: &str) -> Result<Option<LicenseRecord>, BotError>;

    /// Insert or refresh a license owned by `identity`.
    async fn upsert_license(&self, identity: &str, license: &LicenseRecord)
        -> Result<(), BotError>;

    /// Change a license's status. Returns whether a row was updated.
    async fn set_license_status(&self, key: &str, status: LicenseStatus)
        -> Result<bool, BotError>;

    /// Append to the validation log.
    async fn log_validation(
        &self,
        identity: &str,
        key: &str,
        succeeded: bool,
    ) -> Result<(), BotError>;

    /// Record a successfully executed command.
    async fn log_command(&self, identity: &str, command: &str) -> Result<(), BotError>;

    /// Validation usage of one identity over a period.
    async fn get_usage_stats(
        &self,
        identity: &str,
        period: Period,
    ) -> Result<UsageSummary, BotError>;

    /// Whole-bot counters.
    async fn get_bot_stats(&self) -> Result<BotStats, BotError>;

    /// Release connections. Further calls fail.
    async fn close(&self);
}
