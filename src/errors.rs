//! Bot error types.

use crate::policy::tier::Tier;
use serde::Serialize;
use thiserror::Error;

/// Errors produced anywhere in the command pipeline.
#[derive(Debug, Error)]
pub enum BotError {
    /// An argument has the wrong shape.
    #[error("Invalid {field}: {reason}")]
    InvalidFormat {
        /// Name of the offending argument.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A numeric argument fell outside its bounds.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Name of the offending argument.
        field: String,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
        /// The rejected value.
        value: i64,
    },

    /// A required argument was not supplied.
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// Caller tier is below the command's minimum.
    #[error("Insufficient permissions. Required: {required}, your role: {actual}")]
    PermissionDenied {
        /// Minimum tier declared by the command.
        required: Tier,
        /// Tier resolved for the caller.
        actual: Tier,
    },

    /// Licensing API returned a non-success status or an unusable answer.
    #[error("Licensing API error{}: {message}", describe_status(.status))]
    Upstream {
        /// HTTP status, absent when no response was involved or the body
        /// could not be decoded.
        status: Option<u16>,
        /// Upstream or client message.
        message: String,
    },

    /// Licensing API could not be reached or the connection dropped.
    #[error("Licensing API error (transport): {0}")]
    Transport(String),

    /// Local database could not serve the request.
    #[error("Local store unavailable: {0}")]
    StoreUnavailable(String),

    /// No handler is registered for the command.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Unexpected failure inside a handler.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

/// Error taxonomy surfaced in command responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input, rejected before any I/O.
    ValidationError,
    /// Caller tier insufficient.
    PermissionDenied,
    /// Licensing API failure.
    UpstreamError,
    /// Local persistence failure.
    StoreUnavailable,
    /// No such command.
    UnknownCommand,
    /// Anything unexpected.
    InternalError,
}

impl BotError {
    /// Map this error onto the response taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BotError::InvalidFormat { .. }
            | BotError::OutOfRange { .. }
            | BotError::MissingArgument(_) => ErrorKind::ValidationError,
            BotError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            BotError::Upstream { .. } | BotError::Transport(_) => ErrorKind::UpstreamError,
            BotError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            BotError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            BotError::ConfigError(_) | BotError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Transport failures, 429 and 5xx responses qualify. A missing
    /// credential or an undecodable body never does.
    pub fn is_transient(&self) -> bool {
        match self {
            BotError::Transport(_) => true,
            BotError::Upstream {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Shorthand for an [`BotError::InvalidFormat`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        BotError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`BotError::Upstream`].
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        BotError::Upstream {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            BotError::MissingArgument("key".into()).kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            BotError::PermissionDenied {
                required: Tier::Admin,
                actual: Tier::User
            }
            .kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            BotError::upstream(Some(500), "boom").kind(),
            ErrorKind::UpstreamError
        );
        assert_eq!(
            BotError::Internal("x".into()).kind(),
            ErrorKind::InternalError
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(BotError::Transport("timeout".into()).is_transient());
        assert!(!BotError::upstream(None, "API credential not configured").is_transient());
        assert!(!BotError::upstream(None, "Failed to parse licensing API response").is_transient());
        assert!(BotError::upstream(Some(503), "unavailable").is_transient());
        assert!(BotError::upstream(Some(429), "slow down").is_transient());
        assert!(!BotError::upstream(Some(404), "missing").is_transient());
        assert!(!BotError::StoreUnavailable("db".into()).is_transient());
    }

    #[test]
    fn test_permission_denied_message() {
        let err = BotError::PermissionDenied {
            required: Tier::Admin,
            actual: Tier::User,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient permissions. Required: admin, your role: user"
        );
    }

    #[test]
    fn test_upstream_messages() {
        let err = BotError::Transport("connection refused".into());
        assert_eq!(
            err.to_string(),
            "Licensing API error (transport): connection refused"
        );
        assert_eq!(err.kind(), ErrorKind::UpstreamError);
        assert_eq!(
            BotError::upstream(Some(502), "bad gateway").to_string(),
            "Licensing API error (HTTP 502): bad gateway"
        );
        assert_eq!(
            BotError::upstream(None, "API credential not configured").to_string(),
            "Licensing API error: API credential not configured"
        );
    }
}
