//! Collaborators injected into every handler.

use super::descriptor::CommandTable;
use super::invocation::{Caller, CommandInvocation};
use super::response::ReplyState;
use crate::client::{LicenseApi, RetryPolicy};
use crate::clock::Clock;
use crate::policy::ownership::{FieldPrecedenceMatcher, OwnershipRule};
use crate::policy::tier::Tier;
use crate::store::LicenseStore;
use crate::BotError;
use std::sync::Arc;

/// Number of licenses shown per `license list` page.
pub const LICENSE_PAGE_SIZE: usize = 5;

/// Handler-facing settings derived from configuration.
pub struct HandlerSettings {
    /// Application whose licenses are listed and created.
    pub app_id: Option<String>,
    /// Decides which listed licenses belong to the caller.
    pub ownership: Arc<dyn OwnershipRule>,
    /// Backoff for idempotent writes.
    pub retry: RetryPolicy,
    pub license_page_size: usize,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            app_id: None,
            ownership: Arc::new(FieldPrecedenceMatcher::default()),
            retry: RetryPolicy::default(),
            license_page_size: LICENSE_PAGE_SIZE,
        }
    }
}

/// Per-invocation context. Arguments have already been validated against
/// the descriptor's schema.
pub struct HandlerContext {
    pub invocation: CommandInvocation,
    /// Tier resolved for this invocation.
    pub tier: Tier,
    pub api: Arc<dyn LicenseApi>,
    pub store: Arc<dyn LicenseStore>,
    pub clock: Arc<dyn Clock>,
    pub settings: Arc<HandlerSettings>,
    pub commands: Arc<CommandTable>,
    pub reply: ReplyState,
}

impl HandlerContext {
    pub fn caller(&self) -> &Caller {
        &self.invocation.caller
    }

    /// Optional string argument.
    pub fn str_arg(&self, name: &str) -> Option<&str> {
        self.invocation.arguments.get_str(name)
    }

    /// Required string argument. The schema check normally guarantees
    /// presence.
    pub fn required_str(&self, name: &str) -> Result<&str, BotError> {
        self.str_arg(name)
            .ok_or_else(|| BotError::MissingArgument(name.to_string()))
    }

    /// Optional integer argument.
    pub fn int_arg(&self, name: &str) -> Option<i64> {
        self.invocation.arguments.get_int(name)
    }

    /// Configured application id.
    pub fn app_id(&self) -> Result<&str, BotError> {
        self.settings
            .app_id
            .as_deref()
            .ok_or_else(|| BotError::ConfigError("LICENSE_CHAIN_APP_ID is not configured".into()))
    }
}

/// Log and swallow a failure of a supplementary operation.
pub fn tolerate<T>(operation: &str, result: Result<T, BotError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(operation, error = %e, "supplementary operation failed");
            None
        }
    }
}
