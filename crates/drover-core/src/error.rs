//! Error types for the drover core.

use serde::{Deserialize, Serialize};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes surfaced by the core.
///
/// Validation errors fail before any process is spawned. CLI-not-found is
/// raised at adapter construction time. Timeout is a hard rejection: no
/// partial `ExecutionResponse` is produced even when streaming callbacks
/// already fired.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input or option combination, rejected before spawning.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The vendor CLI binary could not be located.
    #[error("{binary} CLI not found on PATH; install it or pass an absolute path")]
    CliNotFound {
        /// The binary name that was searched for.
        binary: String,
    },

    /// The vendor CLI reported that the user is not logged in.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Spawn or runtime failure other than timeout.
    #[error("execution failed: {message}")]
    Execution {
        /// Human-readable description of the failure.
        message: String,
        /// Any stderr captured before the failure.
        stderr: Option<String>,
    },

    /// The process exceeded the configured wall-clock limit.
    #[error("execution timed out after {limit_ms} ms")]
    Timeout {
        /// The configured limit, in milliseconds.
        limit_ms: u64,
    },

    /// Structured-output extraction or schema validation failed.
    #[error("parse error: {message}")]
    Parse {
        /// What went wrong.
        message: String,
        /// The offending text, for debugging.
        text: String,
    },

    /// Session misuse, e.g. `send()` after `abort()`.
    #[error("session error: {0}")]
    Session(String),
}

impl Error {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::CliNotFound { .. } => "CLI_NOT_FOUND",
            Self::Authentication(_) => "AUTHENTICATION",
            Self::Execution { .. } => "EXECUTION",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Parse { .. } => "PARSE",
            Self::Session(_) => "SESSION",
        }
    }
}

/// Serializable error payload carried inside an `ExecutionResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    /// Stable error code (e.g. "EXECUTION").
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional extra detail, typically captured stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ResponseError {
    /// Build a response error from parts.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach detail text.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<&Error> for ResponseError {
    fn from(error: &Error) -> Self {
        let details = match error {
            Error::Execution { stderr, .. } => stderr.clone(),
            Error::Parse { text, .. } => Some(text.clone()),
            _ => None,
        };
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            details,
        }
    }
}
