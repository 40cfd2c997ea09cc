//! Error types for the retry engine.
//!
//! Two families exist:
//!
//! - [`ConfigurationError`] is raised while a policy or its options are being
//!   validated, before any attempt is made.
//! - [`RetryError`] is the terminal outcome of a retry invocation. It always
//!   carries the attempt count and elapsed time, and keeps the last error
//!   returned by the unit of work unchanged.

use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryDisposition;

/// Invalid or unbounded retry configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// The initial interval was zero.
    #[error("initial interval must be greater than zero")]
    ZeroInitialInterval,

    /// The backoff coefficient was below 1.0, NaN, or infinite.
    #[error("backoff coefficient must be a finite value >= 1.0, got {0}")]
    InvalidBackoffCoefficient(f64),

    /// The maximum interval was shorter than the initial interval.
    #[error("maximum interval {maximum:?} is shorter than initial interval {initial:?}")]
    MaximumIntervalTooShort {
        /// Configured initial interval.
        initial: Duration,
        /// Configured maximum interval.
        maximum: Duration,
    },

    /// The expiration was zero.
    #[error("expiration must be greater than zero")]
    ZeroExpiration,

    /// The jitter fraction was outside `[0.0, 1.0]`.
    #[error("jitter must be within [0.0, 1.0], got {0}")]
    InvalidJitter(f64),

    /// Nothing bounds the retry loop.
    #[error(
        "configuration of the retries has to be finite: set maximum attempts, an expiration, or a deadline"
    )]
    Unbounded,
}

/// Terminal failure of a retry invocation.
///
/// Retryable errors are absorbed by the engine; only the last one surfaces,
/// and only once the attempt or time budget is spent.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The error was classified as non-retryable.
    #[error("non-retryable failure after {attempts} attempt(s) in {elapsed:?}: {source}")]
    NonRetryable {
        /// The error returned by the unit of work, unchanged.
        #[source]
        source: E,
        /// Number of attempts issued.
        attempts: u32,
        /// Time since the first attempt started.
        elapsed: Duration,
    },

    /// Every allowed attempt failed with a retryable error.
    #[error("retry attempts exhausted after {attempts} attempt(s) in {elapsed:?}: {source}")]
    AttemptsExhausted {
        /// The error returned by the last attempt, unchanged.
        #[source]
        source: E,
        /// Number of attempts issued.
        attempts: u32,
        /// Time since the first attempt started.
        elapsed: Duration,
    },

    /// The effective deadline was reached.
    #[error("retry deadline exceeded after {attempts} attempt(s) in {elapsed:?}")]
    DeadlineExceeded {
        /// The error returned by the last attempt, if any attempt completed.
        #[source]
        last_error: Option<E>,
        /// Number of attempts issued.
        attempts: u32,
        /// Time since the first attempt started.
        elapsed: Duration,
    },

    /// The invocation was cancelled, either by its token or by the error itself.
    #[error("retry cancelled after {attempts} attempt(s) in {elapsed:?}")]
    Cancelled {
        /// The error returned by the last completed attempt, if any.
        #[source]
        last_error: Option<E>,
        /// Number of attempts issued.
        attempts: u32,
        /// Time since the first attempt started.
        elapsed: Duration,
    },

    /// The policy or options were rejected before any attempt.
    #[error("invalid retry configuration: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl<E> RetryError<E> {
    /// Number of attempts issued before the invocation settled.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::NonRetryable { attempts, .. }
            | Self::AttemptsExhausted { attempts, .. }
            | Self::DeadlineExceeded { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
            Self::Configuration(_) => 0,
        }
    }

    /// Time between the first attempt and settlement.
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::NonRetryable { elapsed, .. }
            | Self::AttemptsExhausted { elapsed, .. }
            | Self::DeadlineExceeded { elapsed, .. }
            | Self::Cancelled { elapsed, .. } => *elapsed,
            Self::Configuration(_) => Duration::ZERO,
        }
    }

    /// The last error returned by the unit of work, if any.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::NonRetryable { source, .. } | Self::AttemptsExhausted { source, .. } => {
                Some(source)
            }
            Self::DeadlineExceeded { last_error, .. } | Self::Cancelled { last_error, .. } => {
                last_error.as_ref()
            }
            Self::Configuration(_) => None,
        }
    }

    /// Consumes the error, returning the last error of the unit of work.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::NonRetryable { source, .. } | Self::AttemptsExhausted { source, .. } => {
                Some(source)
            }
            Self::DeadlineExceeded { last_error, .. } | Self::Cancelled { last_error, .. } => {
                last_error
            }
            Self::Configuration(_) => None,
        }
    }

    /// The disposition that ended the invocation.
    ///
    /// Exhausted attempts report [`RetryDisposition::Retryable`]: the last
    /// error was transient but no budget remained. Configuration errors have
    /// no disposition.
    pub fn disposition(&self) -> Option<RetryDisposition> {
        match self {
            Self::NonRetryable { .. } => Some(RetryDisposition::NonRetryable),
            Self::AttemptsExhausted { .. } => Some(RetryDisposition::Retryable),
            Self::DeadlineExceeded { .. } => Some(RetryDisposition::DeadlineExceeded),
            Self::Cancelled { .. } => Some(RetryDisposition::Cancelled),
            Self::Configuration(_) => None,
        }
    }

    /// Returns `true` if the invocation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns `true` if the effective deadline was reached.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}
