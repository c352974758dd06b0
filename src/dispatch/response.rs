//! Handler output and the renderable response envelope.

use crate::errors::ErrorKind;
use crate::validate::sanitize_for_display;
use crate::BotError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Generic message shown for internal errors.
pub const INTERNAL_ERROR_MESSAGE: &str =
    "An unexpected error occurred while processing your request.";

/// Where the data in a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Licensing API.
    Remote,
    /// Local store as the primary source.
    Local,
    /// Local store because the licensing API failed.
    Fallback,
    /// Both, joined.
    Combined,
    /// Neither; built from static data.
    Static,
}

/// A labelled value in a payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Structured success value of a handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    pub title: String,
    pub description: Option<String>,
    pub fields: Vec<Field>,
    pub source: DataSource,
    /// Set when sourcing was degraded.
    pub notice: Option<String>,
    /// Machine-readable copy of the data.
    pub data: serde_json::Value,
}

impl Payload {
    pub fn new(title: impl Into<String>, source: DataSource) -> Self {
        Self {
            title: title.into(),
            description: None,
            fields: Vec::new(),
            source,
            notice: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Add a field. The value is sanitized for display.
    pub fn field(self, name: impl Into<String>, value: impl AsRef<str>) -> Self {
        self.push_field(name.into(), value.as_ref(), false)
    }

    /// Add an inline field. The value is sanitized for display.
    pub fn inline_field(self, name: impl Into<String>, value: impl AsRef<str>) -> Self {
        self.push_field(name.into(), value.as_ref(), true)
    }

    fn push_field(mut self, name: String, value: &str, inline: bool) -> Self {
        let value = if value.trim().is_empty() {
            "N/A".to_string()
        } else {
            sanitize_for_display(value)
        };
        self.fields.push(Field {
            name,
            value,
            inline,
        });
        self
    }

    pub fn notice(mut self, text: impl Into<String>) -> Self {
        self.notice = Some(text.into());
        self
    }

    pub fn source(mut self, source: DataSource) -> Self {
        self.source = source;
        self
    }

    /// Attach machine-readable data. Values that fail to serialize are dropped.
    pub fn data<T: Serialize>(mut self, value: &T) -> Self {
        self.data = serde_json::to_value(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "payload data not serializable");
            serde_json::Value::Null
        });
        self
    }

    /// Value of the first field named `name`.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HandlerResult {
    Success(Payload),
    Failure { kind: ErrorKind, message: String },
}

impl HandlerResult {
    /// Render an error for the caller. Internal errors get a generic message.
    pub fn from_error(err: &BotError) -> Self {
        let kind = err.kind();
        let message = match kind {
            ErrorKind::InternalError => INTERNAL_ERROR_MESSAGE.to_string(),
            _ => err.to_string(),
        };
        HandlerResult::Failure { kind, message }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HandlerResult::Success(_))
    }

    /// Failure kind, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            HandlerResult::Success(_) => None,
            HandlerResult::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Success payload, if any.
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            HandlerResult::Success(p) => Some(p),
            HandlerResult::Failure { .. } => None,
        }
    }
}

/// How the transport should deliver a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// First and only reply.
    Reply,
    /// Replace the deferred placeholder.
    EditOriginal,
    /// Something was already sent; add a new message.
    FollowUp,
}

/// Per-invocation reply flags shared with the rendering layer.
#[derive(Debug, Clone, Default)]
pub struct ReplyState {
    deferred: Arc<AtomicBool>,
    responded: Arc<AtomicBool>,
}

impl ReplyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that a placeholder ("thinking...") was sent.
    pub fn defer(&self) {
        self.deferred.store(true, Ordering::SeqCst);
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }

    pub fn has_responded(&self) -> bool {
        self.responded.load(Ordering::SeqCst)
    }

    /// Claim the response slot and pick the delivery mode.
    pub fn mark_responded(&self) -> ReplyKind {
        if self.responded.swap(true, Ordering::SeqCst) {
            ReplyKind::FollowUp
        } else if self.is_deferred() {
            ReplyKind::EditOriginal
        } else {
            ReplyKind::Reply
        }
    }
}

/// What the dispatcher hands to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub command: String,
    pub result: HandlerResult,
    pub reply: ReplyKind,
    pub ephemeral: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::tier::Tier;

    #[test]
    fn test_field_values_are_sanitized() {
        let p = Payload::new("t", DataSource::Remote).field("Name", "<script>");
        assert_eq!(p.field_value("Name"), Some("&lt;script&gt;"));
    }

    #[test]
    fn test_empty_field_value_becomes_na() {
        let p = Payload::new("t", DataSource::Remote).inline_field("Email", "  ");
        assert_eq!(p.field_value("Email"), Some("N/A"));
        assert!(p.fields[0].inline);
    }

    #[test]
    fn test_internal_error_is_generic() {
        let result = HandlerResult::from_error(&BotError::Internal("db password=hunter2".into()));
        match result {
            HandlerResult::Failure { kind, message } => {
                assert_eq!(kind, ErrorKind::InternalError);
                assert_eq!(message, INTERNAL_ERROR_MESSAGE);
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn test_permission_denied_is_precise() {
        let err = BotError::PermissionDenied {
            required: Tier::Owner,
            actual: Tier::Admin,
        };
        let result = HandlerResult::from_error(&err);
        assert_eq!(result.error_kind(), Some(ErrorKind::PermissionDenied));
        match result {
            HandlerResult::Failure { message, .. } => assert!(message.contains("owner")),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn test_reply_state_transitions() {
        let fresh = ReplyState::new();
        assert_eq!(fresh.mark_responded(), ReplyKind::Reply);
        assert_eq!(fresh.mark_responded(), ReplyKind::FollowUp);

        let deferred = ReplyState::new();
        deferred.defer();
        assert_eq!(deferred.mark_responded(), ReplyKind::EditOriginal);
        assert!(deferred.has_responded());
    }

    #[test]
    fn test_result_serialization_is_tagged() {
        let ok = HandlerResult::Success(Payload::new("Done", DataSource::Static));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["source"], "static");

        let err = HandlerResult::from_error(&BotError::UnknownCommand("x".into()));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["kind"], "unknown_command");
    }
}
