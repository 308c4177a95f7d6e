//! Relay error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can occur while relaying feed events.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Connection-related errors (WebSocket transport, upgrade request)
    #[error("Connection error: {0}")]
    Connection(String),

    /// The feed rejected the supplied credential. Never retried.
    #[error("Feed credential rejected by the gateway")]
    AuthRejected,

    /// The feed credential is already bound to another live connection. Never retried.
    #[error("Feed credential already in use by another connection")]
    AuthInUse,

    /// The connect/reconnect budget for the current regime is spent.
    #[error("Gave up connecting to the feed after {attempts} {regime} attempts")]
    RetriesExhausted {
        regime: &'static str,
        attempts: u32,
    },

    /// Payload decoding errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Webhook delivery errors
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Errors reported by external storage collaborators
    #[error("Storage error: {0}")]
    Storage(String),

    /// `start` was called while the relay tasks are still running.
    #[error("Relay worker is already running")]
    WorkerAlreadyRunning,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a delivery error.
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the error must terminate the embedding process instead of
    /// being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthRejected | Self::AuthInUse | Self::RetriesExhausted { .. }
        )
    }
}
