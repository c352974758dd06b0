//! Inbound licensing-service webhooks.
//!
//! Security properties:
//! - The `sha256=<hex>` signature header is checked with HMAC-SHA256 in
//!   constant time before the body is parsed
//! - Bodies above [`MAX_BODY_LEN`] are rejected unread
//! - Unsigned or mis-signed deliveries are logged and dropped

use crate::crypto::webhook::verify_webhook_signature;
use crate::protocol::models::LicenseStatus;
use crate::store::LicenseStore;
use crate::BotError;
use serde::Deserialize;
use serde_json::Value;

/// Largest accepted webhook body.
pub const MAX_BODY_LEN: usize = 64 * 1024;

/// Known event names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookKind {
    LicenseCreated,
    LicenseUpdated,
    LicenseRevoked,
    LicenseExpired,
    /// Anything else; kept for logging.
    Other(String),
}

impl WebhookKind {
    fn from_name(name: &str) -> Self {
        match name {
            "license.created" => WebhookKind::LicenseCreated,
            "license.updated" => WebhookKind::LicenseUpdated,
            "license.revoked" => WebhookKind::LicenseRevoked,
            "license.expired" => WebhookKind::LicenseExpired,
            other => WebhookKind::Other(other.to_string()),
        }
    }
}

/// A verified webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub kind: WebhookKind,
    /// Event name as delivered.
    pub name: String,
    pub data: Value,
}

impl WebhookEvent {
    /// License key referenced by the event, if any.
    pub fn license_key(&self) -> Option<&str> {
        ["key", "licenseKey", "license_key"]
            .iter()
            .find_map(|field| self.data.get(*field).and_then(Value::as_str))
    }

    /// Status the event implies for its license.
    pub fn implied_status(&self) -> Option<LicenseStatus> {
        match &self.kind {
            WebhookKind::LicenseRevoked => Some(LicenseStatus::Revoked),
            WebhookKind::LicenseExpired => Some(LicenseStatus::Expired),
            WebhookKind::LicenseUpdated => self
                .data
                .get("status")
                .and_then(Value::as_str)
                .map(LicenseStatus::parse),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Verifies and decodes webhook deliveries.
#[derive(Clone)]
pub struct WebhookReceiver {
    secret: String,
}

impl std::fmt::Debug for WebhookReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookReceiver").finish_non_exhaustive()
    }
}

impl WebhookReceiver {
    /// # Errors
    ///
    /// `ConfigError` when the secret is blank.
    pub fn new(secret: impl Into<String>) -> Result<Self, BotError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(BotError::ConfigError("webhook secret is empty".into()));
        }
        Ok(Self { secret })
    }

    /// Verify `signature` over the raw `body`, then decode the event.
    pub fn receive(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookEvent, BotError> {
        if body.len() > MAX_BODY_LEN {
            tracing::warn!(len = body.len(), "webhook body too large");
            return Err(BotError::invalid("webhook", "body too large"));
        }
        let Some(signature) = signature else {
            tracing::warn!("webhook delivery without signature");
            return Err(BotError::invalid("webhook", "missing signature"));
        };
        if !verify_webhook_signature(body, signature.trim(), &self.secret) {
            tracing::warn!("webhook signature mismatch");
            return Err(BotError::invalid("webhook", "signature mismatch"));
        }

        let raw: RawEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::warn!(error = %e, "webhook body is not valid JSON");
            BotError::invalid("webhook", "malformed body")
        })?;
        let name = raw
            .event
            .or(raw.kind)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| BotError::invalid("webhook", "missing event name"))?;

        tracing::info!(event = %name, "webhook received");
        Ok(WebhookEvent {
            kind: WebhookKind::from_name(&name),
            name,
            data: raw.data,
        })
    }

    /// Mirror a status change into the local store. Returns whether a cached
    /// license was updated.
    pub async fn apply(&self, event: &WebhookEvent, store: &dyn LicenseStore) -> Result<bool, BotError> {
        match (event.license_key(), event.implied_status()) {
            (Some(key), Some(status)) => store.set_license_status(key, status).await,
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::webhook::sign_payload;
    use crate::testing::{license, MockStore, KEY_A};

    const SECRET: &str = "whsec_test";

    fn receiver() -> WebhookReceiver {
        WebhookReceiver::new(SECRET).unwrap()
    }

    #[test]
    fn test_accepts_signed_event() {
        let body = br#"{"event":"license.revoked","data":{"licenseKey":"ABC"}}"#;
        let event = receiver()
            .receive(body, Some(&sign_payload(body, SECRET)))
            .unwrap();
        assert_eq!(event.kind, WebhookKind::LicenseRevoked);
        assert_eq!(event.license_key(), Some("ABC"));
        assert_eq!(event.implied_status(), Some(LicenseStatus::Revoked));
    }

    #[test]
    fn test_type_field_is_accepted() {
        let body = br#"{"type":"user.created","data":{}}"#;
        let event = receiver()
            .receive(body, Some(&sign_payload(body, SECRET)))
            .unwrap();
        assert_eq!(event.kind, WebhookKind::Other("user.created".into()));
        assert_eq!(event.implied_status(), None);
    }

    #[test]
    fn test_rejects_bad_or_missing_signature() {
        let body = br#"{"event":"license.created","data":{}}"#;
        let wrong = sign_payload(body, "other-secret");
        assert!(matches!(
            receiver().receive(body, Some(&wrong)),
            Err(BotError::InvalidFormat { .. })
        ));
        assert!(receiver().receive(body, None).is_err());
    }

    #[test]
    fn test_rejects_unnamed_event() {
        let body = br#"{"data":{}}"#;
        assert!(receiver().receive(body, Some(&sign_payload(body, SECRET))).is_err());
    }

    #[test]
    fn test_blank_secret_is_config_error() {
        assert!(matches!(WebhookReceiver::new("  "), Err(BotError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_apply_updates_cached_status() {
        let store = MockStore::new();
        store.seed_license("u1", license(KEY_A, "u1", LicenseStatus::Active));
        let body = format!(r#"{{"event":"license.expired","data":{{"key":"{}"}}}}"#, KEY_A);
        let event = receiver()
            .receive(body.as_bytes(), Some(&sign_payload(body.as_bytes(), SECRET)))
            .unwrap();
        assert!(receiver().apply(&event, &store).await.unwrap());
        assert_eq!(store.license_status(KEY_A), Some(LicenseStatus::Expired));
    }
}
