//! Structured logging for service calls
//!
//! Every RPC issued by the client is logged through this layer, once when it
//! starts and once when the retry engine settles it.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ClientError;

/// Call metadata for structured logging
#[derive(Debug, Clone)]
pub struct CallMetadata {
    /// Service method name
    pub method: &'static str,
    /// Namespace the call is issued in
    pub namespace: String,
}

impl CallMetadata {
    /// Create new call metadata
    pub fn new(method: &'static str, namespace: impl Into<String>) -> Self {
        Self {
            method,
            namespace: namespace.into(),
        }
    }

    /// Log call being sent
    pub fn log_request(&self) {
        debug!(
            method = self.method,
            namespace = %self.namespace,
            "Sending service call"
        );
    }
}

/// Outcome metadata for structured logging
#[derive(Debug, Clone, Copy)]
pub struct CallOutcome {
    /// Time from the first attempt until settlement
    pub elapsed: Duration,
    /// Number of attempts issued
    pub attempts: u32,
}

impl CallOutcome {
    /// Create new outcome metadata
    pub fn new(elapsed: Duration, attempts: u32) -> Self {
        Self { elapsed, attempts }
    }

    /// Log successful call
    pub fn log_success(&self, call: &CallMetadata) {
        debug!(
            method = call.method,
            namespace = %call.namespace,
            elapsed_ms = self.elapsed.as_millis(),
            attempts = self.attempts,
            "Service call succeeded"
        );
    }

    /// Log failed call
    pub fn log_error(&self, call: &CallMetadata, error: &ClientError) {
        warn!(
            method = call.method,
            namespace = %call.namespace,
            elapsed_ms = self.elapsed.as_millis(),
            attempts = self.attempts,
            status = ?error.status().map(|s| s.status_code()),
            error = %error,
            "Service call failed"
        );
    }
}
