#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core retry engine for the TurboFlow workflow client runtime.
//!
//! Every call the client or worker makes to the orchestration service goes
//! through this crate. It provides:
//!
//! - **Validated retry policies** via [`RetryPolicy`] and its builder
//! - **Pure error classification** via [`ErrorClassifier`] and the [`Classify`] trait
//! - **Deadline merging** of caller deadlines and policy expiration via [`DeadlineCoordinator`]
//! - **Blocking execution** via [`SyncRetryExecutor`]
//! - **Non-blocking execution** via [`RetryFuture`] and the cancellable [`RetryHandle`]
//! - **A single entry point** via the [`Retryer`] facade
//!
//! The engine holds no global state. A [`Retryer`] is constructed by whichever
//! client or worker component needs it and passed around explicitly.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use turboflow_core::prelude::*;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("service unavailable")]
//! struct Unavailable;
//!
//! impl Classify for Unavailable {
//!     fn code(&self) -> &str {
//!         "UNAVAILABLE"
//!     }
//! }
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .initial_interval(Duration::from_millis(10))
//!     .maximum_attempts(3)
//!     .build()?;
//!
//! let retryer = Retryer::new(policy);
//! let options = retryer.options(None)?;
//!
//! let value = retryer.retry_with_result(&options, || Ok::<_, Unavailable>(42))?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod retry;

pub use error::{ConfigurationError, RetryError};

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use turboflow_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ConfigurationError, RetryError};
    pub use crate::retry::{
        Backoff, Budget, Classify, Deadline, DeadlineCoordinator, ErrorClassifier, ErrorMatcher,
        RetryDisposition, RetryFuture, RetryHandle, RetryInvocation, RetryOptions, RetryPolicy,
        RetryPolicyBuilder, RetryPolicyConfig, RetryProgress, Retryer, SyncRetryExecutor,
    };
}
