//! Error types for `portrelay`

use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for `portrelay` operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The local port of a rule could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The target endpoint could not be reached
    #[error("failed to dial {target}: {reason}")]
    Dial { target: String, reason: String },

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No engine registered under this rule id
    #[error("rule {0} not found")]
    RuleNotFound(String),

    /// An engine is already registered under this rule id
    #[error("rule {0} already exists")]
    RuleExists(String),

    /// Rule failed validation
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A remote agent rejected or failed a request
    #[error("remote agent error: {0}")]
    Remote(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RelayError {
    /// True for errors raised while binding a rule's local port.
    pub fn is_bind_error(&self) -> bool {
        matches!(self, RelayError::Bind { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}
