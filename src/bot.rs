//! Bot assembly - wires configuration into a ready [`Dispatcher`].
//!
//! `LicenseBot` owns the long-lived collaborators: the licensing API client,
//! the local store and the optional webhook receiver. Create one per
//! process and share its dispatcher with the transport.

use crate::client::HttpLicenseClient;
use crate::clock::{Clock, SystemClock};
use crate::commands::command_table;
use crate::config::BotConfig;
use crate::dispatch::{Dispatcher, HandlerSettings};
use crate::policy::ownership::FieldPrecedenceMatcher;
use crate::policy::tier::PermissionResolver;
use crate::store::{LicenseStore, SqliteStore, UnavailableStore};
use crate::webhook::{WebhookEvent, WebhookReceiver};
use crate::BotError;
use std::sync::Arc;

/// A fully wired bot.
pub struct LicenseBot {
    dispatcher: Arc<Dispatcher>,
    webhooks: Option<WebhookReceiver>,
}

impl LicenseBot {
    /// Build the bot from configuration, using the system clock.
    ///
    /// A store that fails to open does not abort startup; the bot runs with
    /// a store that reports every call as unavailable and commands degrade
    /// accordingly.
    ///
    /// # Errors
    /// - `ConfigError` - invalid API URL, HTTP client setup failure or a
    ///   blank webhook secret
    pub async fn from_config(config: &BotConfig) -> Result<Self, BotError> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Build the bot with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub async fn from_config_with_clock(
        config: &BotConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BotError> {
        Self::with_clock(config, clock).await
    }

    async fn with_clock(config: &BotConfig, clock: Arc<dyn Clock>) -> Result<Self, BotError> {
        let api = HttpLicenseClient::new(config)?;
        let webhooks = config
            .webhook_secret
            .as_deref()
            .map(WebhookReceiver::new)
            .transpose()?;

        let store: Arc<dyn LicenseStore> =
            match SqliteStore::connect(&config.database_path, Arc::clone(&clock)).await {
                Ok(store) => {
                    tracing::info!(path = %config.database_path.display(), "store opened");
                    Arc::new(store)
                }
                Err(e) => {
                    tracing::warn!(
                        path = %config.database_path.display(),
                        error = %e,
                        "store unavailable, continuing without local data"
                    );
                    Arc::new(UnavailableStore::new(e.to_string()))
                }
            };

        let settings = HandlerSettings {
            app_id: config.app_id.clone(),
            ownership: Arc::new(FieldPrecedenceMatcher::new(config.owner_fields.clone())),
            ..HandlerSettings::default()
        };
        let resolver =
            PermissionResolver::new(config.owner_id.clone(), config.admin_role_ids.clone());

        let dispatcher = Dispatcher::new(
            command_table()?,
            resolver,
            Arc::new(api),
            store,
            clock,
            settings,
        );
        tracing::info!(
            commands = dispatcher.table().len(),
            webhooks = webhooks.is_some(),
            "bot ready"
        );

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            webhooks,
        })
    }

    /// Dispatcher shared with the transport.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Verify a webhook delivery and mirror it into the local store.
    ///
    /// `signature` is the `sha256=<hex>` value of the delivery's signature
    /// header.
    ///
    /// # Errors
    /// - `ConfigError` - no webhook secret configured
    /// - `InvalidFormat` - bad signature or malformed body
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, BotError> {
        let receiver = self
            .webhooks
            .as_ref()
            .ok_or_else(|| BotError::ConfigError("WEBHOOK_SECRET is not configured".into()))?;
        let event = receiver.receive(body, signature)?;
        if let Err(e) = receiver.apply(&event, self.dispatcher.store().as_ref()).await {
            tracing::warn!(event = %event.name, error = %e, "webhook not mirrored to store");
        }
        Ok(event)
    }

    /// Release the store.
    pub async fn shutdown(&self) {
        self.dispatcher.store().close().await;
        tracing::info!("bot stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::crypto::webhook::sign_payload;
    use crate::dispatch::{Caller, CommandInvocation, DataSource};
    use crate::errors::ErrorKind;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> BotConfig {
        let mut config = BotConfig::default();
        config.database_path = dir.path().join("bot.db");
        config.webhook_secret = Some("whsec_test".into());
        config
    }

    async fn bot(config: &BotConfig) -> LicenseBot {
        let clock = Arc::new(MockClock::from_rfc3339("2025-06-01T12:00:00Z"));
        LicenseBot::from_config_with_clock(config, clock).await.unwrap()
    }

    #[tokio::test]
    async fn test_bot_serves_static_commands() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&config(&dir)).await;
        let response = bot
            .dispatcher()
            .dispatch(CommandInvocation::new("help", None, Caller::new("u1")))
            .await;
        assert_eq!(response.result.payload().unwrap().source, DataSource::Static);
        bot.shutdown().await;
    }

    #[tokio::test]
    async fn test_unopenable_store_degrades() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        // A directory cannot be opened as a database file.
        config.database_path = dir.path().to_path_buf();
        let bot = bot(&config).await;

        let response = bot
            .dispatcher()
            .dispatch(CommandInvocation::new("analytics", Some("usage"), Caller::new("u1")))
            .await;
        assert_eq!(response.result.error_kind(), Some(ErrorKind::StoreUnavailable));
    }

    #[tokio::test]
    async fn test_handle_webhook() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&config(&dir)).await;
        let body = br#"{"event":"license.revoked","data":{"key":"UNKNOWN"}}"#;

        let event = bot
            .handle_webhook(body, Some(&sign_payload(body, "whsec_test")))
            .await
            .unwrap();
        assert_eq!(event.name, "license.revoked");
        assert!(bot.handle_webhook(body, Some("sha256=00")).await.is_err());
    }

    #[tokio::test]
    async fn test_blank_webhook_secret_fails_startup() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.webhook_secret = Some(" ".into());
        assert!(matches!(
            LicenseBot::from_config(&config).await,
            Err(BotError::ConfigError(_))
        ));
    }
}
