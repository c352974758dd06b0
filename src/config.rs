//! Bot configuration.

use crate::BotError;
use std::path::PathBuf;
use std::time::Duration;

/// Default licensing API base URL.
pub const DEFAULT_API_URL: &str = "https://api.licensechain.app";

/// Default owner fields consulted when filtering license listings.
pub const DEFAULT_OWNER_FIELDS: &str = "userId,discordId,email,issuedTo,issuedEmail";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration for the bot.
///
/// Loaded from the environment at startup. Only the chat transport token is
/// required by the binary; everything else has a default or degrades the
/// feature set.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Chat platform credential.
    pub discord_token: Option<String>,

    /// Licensing API base URL, without trailing slash.
    pub api_url: String,

    /// Bearer credential for the licensing API.
    /// Without it every upstream call fails fast.
    pub api_key: Option<String>,

    /// Application whose licenses are listed and created.
    pub app_id: Option<String>,

    /// Identity of the single bot owner.
    pub owner_id: Option<String>,

    /// Role ids granting the admin tier.
    pub admin_role_ids: Vec<String>,

    /// Per-request timeout for upstream calls.
    pub request_timeout: Duration,

    /// SQLite database file.
    pub database_path: PathBuf,

    /// Shared secret for inbound webhook signatures.
    pub webhook_secret: Option<String>,

    /// Ordered owner fields for license ownership matching.
    pub owner_fields: Vec<String>,
}

impl BotConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, BotError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary lookup function.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a value cannot be parsed or the resulting
    /// configuration fails [`BotConfig::validate`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let request_timeout = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|e| {
                    BotError::ConfigError(format!("REQUEST_TIMEOUT_SECS '{}': {}", raw, e))
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let database_path = match get("DATABASE_URL") {
            Some(raw) => PathBuf::from(raw.strip_prefix("sqlite://").unwrap_or(&raw)),
            None => default_database_path(),
        };

        let config = Self {
            discord_token: get("DISCORD_TOKEN"),
            api_url: get("LICENSE_CHAIN_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: get("LICENSE_CHAIN_API_KEY"),
            app_id: get("LICENSE_CHAIN_APP_ID"),
            owner_id: get("BOT_OWNER_ID"),
            admin_role_ids: split_csv(get("ADMIN_ROLE_IDS").as_deref().unwrap_or("")),
            request_timeout,
            database_path,
            webhook_secret: get("WEBHOOK_SECRET"),
            owner_fields: split_csv(
                get("LICENSE_OWNER_FIELDS")
                    .as_deref()
                    .unwrap_or(DEFAULT_OWNER_FIELDS),
            ),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), BotError> {
        if !(self.api_url.starts_with("https://") || self.api_url.starts_with("http://")) {
            return Err(BotError::ConfigError(format!(
                "LICENSE_CHAIN_API_URL must be an http(s) URL, got '{}'",
                self.api_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(BotError::ConfigError(
                "REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        if self.owner_fields.is_empty() {
            return Err(BotError::ConfigError(
                "LICENSE_OWNER_FIELDS cannot be empty".to_string(),
            ));
        }
        if self.api_key.is_none() {
            tracing::warn!("LICENSE_CHAIN_API_KEY not set, licensing API calls will fail");
        }
        Ok(())
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            discord_token: None,
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            app_id: None,
            owner_id: None,
            admin_role_ids: Vec::new(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            database_path: default_database_path(),
            webhook_secret: None,
            owner_fields: split_csv(DEFAULT_OWNER_FIELDS),
        }
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("licensebot")
        .join("bot.db")
}
