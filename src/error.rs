//! Error types for respwire
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using RespError
pub type Result<T> = std::result::Result<T, RespError>;

/// Unified error type for respwire operations
#[derive(Debug, Error)]
pub enum RespError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    /// Malformed input. The stream is desynchronized after this.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The source ended in the middle of a value
    #[error("unexpected end of input")]
    UnexpectedEof,

    // -------------------------------------------------------------------------
    // Append-Only Log Errors
    // -------------------------------------------------------------------------
    #[error("closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RespError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        RespError::Protocol(msg.into())
    }

    /// True for errors caused by malformed input rather than I/O
    pub fn is_protocol(&self) -> bool {
        matches!(self, RespError::Protocol(_))
    }
}
