//! Error types for protocol operations
//!
//! Provides error types for status parsing and payload (de)serialization.

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur during protocol operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A status code name was not recognised
    #[error("unknown status code: {0}")]
    UnknownCode(String),

    /// A numeric status code was out of range
    #[error("status code out of range: {0}")]
    CodeOutOfRange(i32),

    /// Missing required field
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
