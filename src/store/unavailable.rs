//! Store stand-in used when the database could not be opened.

use super::{LicenseStore, UserRecord, UserUpdate};
use crate::meter::usage::{BotStats, Period, UsageSummary};
use crate::protocol::models::{LicenseRecord, LicenseStatus};
use crate::BotError;
use async_trait::async_trait;

/// Answers every call with `StoreUnavailable`.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    /// Create with the reason the real store failed to open.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T, BotError> {
        Err(BotError::StoreUnavailable(self.reason.clone()))
    }
}

#[async_trait]
impl LicenseStore for UnavailableStore {
    async fn get_user(&self, _identity: &str) -> Result<Option<UserRecord>, BotError> {
        self.fail()
    }

    async fn get_or_create_user(
        &self,
        _identity: &str,
        _username: Option<&str>,
    ) -> Result<UserRecord, BotError> {
        self.fail()
    }

    async fn update_user(
        &self,
        _identity: &str,
        _update: &UserUpdate,
    ) -> Result<UserRecord, BotError> {
        self.fail()
    }

    async fn get_user_licenses(&self, _identity: &str) -> Result<Vec<LicenseRecord>, BotError> {
        self.fail()
    }

    async fn find_license(&self, _key: &str) -> Result<Option<LicenseRecord>, BotError> {
        self.fail()
    }

    async fn upsert_license(
        &self,
        _identity: &str,
        _license: &LicenseRecord,
    ) -> Result<(), BotError> {
        self.fail()
    }

    async fn set_license_status(
        &self,
        _key: &str,
        _status: LicenseStatus,
    ) -> Result<bool, BotError> {
        self.fail()
    }

    async fn log_validation(
        &self,
        _identity: &str,
        _key: &str,
        _succeeded: bool,
    ) -> Result<(), BotError> {
        self.fail()
    }

    async fn log_command(&self, _identity: &str, _command: &str) -> Result<(), BotError> {
        self.fail()
    }

    async fn get_usage_stats(
        &self,
        _identity: &str,
        _period: Period,
    ) -> Result<UsageSummary, BotError> {
        self.fail()
    }

    async fn get_bot_stats(&self) -> Result<BotStats, BotError> {
        self.fail()
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_call_fails_with_reason() {
        let store = UnavailableStore::new("disk full");
        match store.get_bot_stats().await {
            Err(BotError::StoreUnavailable(reason)) => assert_eq!(reason, "disk full"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(store.log_validation("u", "K", true).await.is_err());
        assert!(store.get_user("u").await.is_err());
    }
}
