//! Retry engine: policies, classification, deadlines and executors.
//!
//! Control flow for one call:
//!
//! 1. [`RetryOptions`] pairs a validated [`RetryPolicy`] with an optional caller
//!    [`Deadline`] and cancellation token, rejecting unbounded combinations.
//! 2. A [`DeadlineCoordinator`] opens a fresh [`RetryInvocation`] and merges the
//!    caller deadline with the policy expiration.
//! 3. [`SyncRetryExecutor`] (blocking) or [`RetryFuture`] (non-blocking) runs the
//!    unit of work, asks the [`ErrorClassifier`] about each failure and either
//!    settles or waits for the next backoff.
//!
//! # Key Types
//!
//! - [`Retryer`] - facade constructed once and injected into clients
//! - [`RetryPolicy`] - immutable backoff shape and bounds
//! - [`RetryDisposition`] - tagged classification result

mod blocking;
mod classifier;
mod deadline;
mod decision;
mod future;
mod policy;
mod retryer;

pub use blocking::SyncRetryExecutor;
pub use classifier::{Classify, ErrorClassifier, ErrorMatcher, RetryDisposition};
pub use deadline::{Backoff, Budget, Deadline, DeadlineCoordinator, RetryInvocation};
pub use future::{RetryFuture, RetryHandle, RetryProgress};
pub use policy::{
    DEFAULT_JITTER, DEFAULT_MAXIMUM_INTERVAL_COEFFICIENT, RetryPolicy, RetryPolicyBuilder,
    RetryPolicyConfig,
};
pub use retryer::{RetryOptions, Retryer};
