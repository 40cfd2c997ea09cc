//! Error types for the workflow service client
//!
//! Every failed RPC surfaces as [`ClientError::Rpc`], wrapping the retry
//! engine's terminal error so callers can see both the final service status
//! and how many attempts were spent on it.

use thiserror::Error;
use turboflow_core::{ConfigurationError, RetryError};
use turboflow_protocol::{ProtocolError, Status};

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Main error type for the workflow service client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An RPC failed after the retry engine gave up on it.
    #[error("{method} failed: {source}")]
    Rpc {
        /// Service method name, e.g. `StartWorkflowExecution`.
        method: &'static str,
        /// Terminal retry outcome carrying the last status.
        #[source]
        source: RetryError<Status>,
    },

    /// The retry policy or its combination with a call deadline is invalid.
    #[error("invalid retry policy: {0}")]
    RetryPolicy(#[from] ConfigurationError),

    /// A request was rejected before it was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ProtocolError),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O failure, such as reading a configuration file or starting a runtime.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// The last status returned by the service, if the error came from an RPC.
    pub fn status(&self) -> Option<&Status> {
        match self {
            Self::Rpc { source, .. } => source.last_error(),
            _ => None,
        }
    }

    /// Attempts spent on the RPC; 0 for errors raised before any attempt.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Rpc { source, .. } => source.attempts(),
            _ => 0,
        }
    }

    /// Returns `true` if the call was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Rpc { source, .. } if source.is_cancelled())
    }

    /// Returns `true` if the call ran out of time.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::Rpc { source, .. } if source.is_deadline_exceeded())
    }
}
