//! Error types for the mail gateway.

use std::time::Duration;

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("{feature} is not configured")]
    Disabled { feature: String },
}

/// Errors raised while talking POP3 or SMTP.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to connect to {server}: {reason}")]
    Connect { server: String, reason: String },

    #[error("Authentication rejected: {line}")]
    Auth { line: String },

    #[error("Unexpected server reply: {0}")]
    Protocol(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Failed to parse message: {0}")]
    Parse(String),

    #[error("Failed to send email: {0}")]
    Send(String),

    #[error("All {failed} messages in the batch failed")]
    Batch { failed: u32 },

    #[error("Store rejected message: {0}")]
    Store(#[from] StoreError),
}

impl MailError {
    /// Whether this error leaves the connection unusable, ending the batch.
    pub fn aborts_batch(&self) -> bool {
        matches!(self, MailError::Timeout { .. } | MailError::Connect { .. })
    }

    pub(crate) fn connection_lost(server: &str, reason: impl ToString) -> Self {
        MailError::Connect {
            server: server.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Message store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
