//! The licensing API as seen by handlers.

use crate::meter::usage::Period;
use crate::protocol::models::{
    AnalyticsReport, HealthStatus, LicenseAnalytics, LicensePatch, LicenseRecord, NewLicense,
    NewProduct, NewUser, Page, Product, UserPatch, UserProfile, ValidationOutcome, Webhook,
};
use crate::BotError;
use async_trait::async_trait;

/// Result of an operation the upstream may not implement.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    /// The upstream answered.
    Available(T),
    /// The upstream does not offer this operation; callers fall back locally.
    NotSupported {
        /// Operation name, for logs.
        operation: &'static str,
    },
}

impl<T> ApiOutcome<T> {
    /// The value, if the upstream provided one.
    pub fn into_option(self) -> Option<T> {
        match self {
            ApiOutcome::Available(value) => Some(value),
            ApiOutcome::NotSupported { .. } => None,
        }
    }
}

/// Operations offered by the licensing service.
///
/// Every method fails with `BotError::Transport` when the service cannot be
/// reached and `BotError::Upstream` on a non-success status or an
/// undecodable body. Nothing here retries; see [`crate::client::retry`].
#[async_trait]
pub trait LicenseApi: Send + Sync {
    /// Check a license key, optionally bound to a hardware id.
    async fn validate_license(
        &self,
        key: &str,
        hardware_id: Option<&str>,
    ) -> Result<ValidationOutcome, BotError>;

    /// Fetch one license by key or id.
    async fn get_license(&self, id: &str) -> Result<LicenseRecord, BotError>;

    /// Issue a license under an application.
    async fn create_license(
        &self,
        app_id: &str,
        data: &NewLicense,
    ) -> Result<LicenseRecord, BotError>;

    /// Apply a partial update.
    async fn update_license(
        &self,
        id: &str,
        patch: &LicensePatch,
    ) -> Result<LicenseRecord, BotError>;

    /// Revoke a license. Idempotent upstream.
    async fn revoke_license(&self, id: &str) -> Result<(), BotError>;

    /// Every license of an application, unfiltered.
    async fn list_licenses_for_app(&self, app_id: &str) -> Result<Vec<LicenseRecord>, BotError>;

    /// Usage analytics for one license.
    async fn get_license_analytics(
        &self,
        id: &str,
        period: Period,
    ) -> Result<LicenseAnalytics, BotError>;

    /// Account-wide analytics.
    async fn get_analytics(
        &self,
        period: Period,
        metrics: &[&str],
    ) -> Result<AnalyticsReport, BotError>;

    /// Look up a user. Some deployments do not expose this.
    async fn get_user(&self, id: &str) -> Result<ApiOutcome<UserProfile>, BotError>;

    /// Register a user.
    async fn create_user(&self, user: &NewUser) -> Result<UserProfile, BotError>;

    /// Change a user's name or email.
    async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<UserProfile, BotError>;

    /// One page of users.
    async fn list_users(&self, page: u32, limit: u32) -> Result<Page<UserProfile>, BotError>;

    /// Fetch one product.
    async fn get_product(&self, id: &str) -> Result<Product, BotError>;

    /// Create a product.
    async fn create_product(&self, product: &NewProduct) -> Result<Product, BotError>;

    /// One page of products.
    async fn list_products(&self, page: u32, limit: u32) -> Result<Page<Product>, BotError>;

    /// Registered webhooks.
    async fn list_webhooks(&self) -> Result<Vec<Webhook>, BotError>;

    /// Service health.
    async fn health_check(&self) -> Result<HealthStatus, BotError>;
}
