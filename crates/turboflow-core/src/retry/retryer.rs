//! The retry facade.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::blocking::SyncRetryExecutor;
use super::classifier::Classify;
use super::deadline::{Deadline, DeadlineCoordinator};
use super::future::{RetryFuture, RetryHandle};
use super::policy::RetryPolicy;
use crate::error::{ConfigurationError, RetryError};

/// A policy paired with the caller's deadline and cancellation token.
///
/// Construction checks both the backoff shape and that the pair bounds the
/// retry loop, so every invocation started with these options terminates.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use turboflow_core::retry::{Deadline, RetryOptions, RetryPolicy};
///
/// // No attempt limit and no expiration: only the deadline bounds the loop.
/// let policy = RetryPolicy::builder().build().unwrap();
/// assert!(RetryOptions::new(policy.clone(), None).is_err());
///
/// let options = RetryOptions::new(policy, Some(Deadline::after(Duration::from_secs(5)))).unwrap();
/// assert!(options.deadline().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct RetryOptions {
    policy: Arc<RetryPolicy>,
    deadline: Option<Deadline>,
    cancel: Option<CancellationToken>,
}

impl RetryOptions {
    /// Pairs `policy` with an optional caller deadline.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the policy is invalid or if neither
    /// the policy nor `deadline` bounds the retry loop.
    pub fn new(
        policy: impl Into<Arc<RetryPolicy>>,
        deadline: Option<Deadline>,
    ) -> Result<Self, ConfigurationError> {
        let policy = policy.into();
        policy.validate()?;
        policy.validate_bounded(deadline.is_some())?;
        Ok(Self {
            policy,
            deadline,
            cancel: None,
        })
    }

    /// Attach a cancellation token observed by every executor.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) fn policy_arc(&self) -> &Arc<RetryPolicy> {
        &self.policy
    }

    /// The caller's deadline, if any.
    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    /// The cancellation token, if any.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// A fresh coordinator for one invocation.
    pub fn coordinator(&self) -> DeadlineCoordinator {
        DeadlineCoordinator::new(self.deadline)
    }
}

/// Entry point of the retry engine.
///
/// Constructed explicitly and passed to whatever issues remote calls; there
/// is no process-wide instance. Cloning is cheap: the default policy is
/// shared behind an `Arc`.
///
/// Every operation builds its own coordinator and invocation, so one
/// `Retryer` can serve any number of concurrent calls.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use turboflow_core::retry::{Classify, RetryPolicy, Retryer};
///
/// #[derive(Debug)]
/// struct Unavailable;
///
/// impl std::fmt::Display for Unavailable {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         f.write_str("unavailable")
///     }
/// }
///
/// impl Classify for Unavailable {
///     fn code(&self) -> &str {
///         "UNAVAILABLE"
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let retryer = Retryer::new(
///     RetryPolicy::builder()
///         .initial_interval(Duration::from_millis(1))
///         .maximum_attempts(3)
///         .build()?,
/// );
/// let options = retryer.options(None)?;
///
/// let value = retryer
///     .retry_with_result_async(&options, || async { Ok::<_, Unavailable>(7) })
///     .await
///     .map_err(|e| e.to_string())?;
/// assert_eq!(value, 7);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Retryer {
    policy: Arc<RetryPolicy>,
}

impl Retryer {
    /// Creates a retryer whose default policy is `policy`.
    pub fn new(policy: impl Into<Arc<RetryPolicy>>) -> Self {
        Self {
            policy: policy.into(),
        }
    }

    /// The default policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Options pairing the default policy with `deadline`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the pair does not bound the loop.
    pub fn options(&self, deadline: Option<Deadline>) -> Result<RetryOptions, ConfigurationError> {
        RetryOptions::new(Arc::clone(&self.policy), deadline)
    }

    /// Retries a blocking procedure on the calling thread.
    ///
    /// # Errors
    ///
    /// See [`retry_with_result`](Self::retry_with_result).
    pub fn retry<E, F>(&self, options: &RetryOptions, procedure: F) -> Result<(), RetryError<E>>
    where
        F: FnMut() -> Result<(), E>,
        E: Classify + fmt::Display,
    {
        self.retry_with_result(options, procedure)
    }

    /// Retries a blocking function on the calling thread and returns its value.
    ///
    /// The thread sleeps through every backoff. Cancellation through the
    /// options' token interrupts the sleep.
    ///
    /// # Errors
    ///
    /// Returns the last error of `function` wrapped in a [`RetryError`]
    /// annotated with the attempt count and elapsed time.
    pub fn retry_with_result<T, E, F>(
        &self,
        options: &RetryOptions,
        function: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + fmt::Display,
    {
        let executor = SyncRetryExecutor::new(options.policy(), options.coordinator());
        match options.cancellation() {
            Some(token) => executor.with_cancellation(token).execute(function),
            None => executor.execute(function),
        }
    }

    /// Retries an asynchronous procedure without blocking a thread.
    pub fn retry_async<E, F, Fut>(
        &self,
        options: &RetryOptions,
        supplier: F,
    ) -> RetryFuture<F, Fut, (), E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Classify + fmt::Display,
    {
        RetryFuture::new(options, supplier)
    }

    /// Retries an asynchronous function without blocking a thread.
    ///
    /// `supplier` is called once per attempt; the returned future is lazy.
    pub fn retry_with_result_async<T, E, F, Fut>(
        &self,
        options: &RetryOptions,
        supplier: F,
    ) -> RetryFuture<F, Fut, T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        RetryFuture::new(options, supplier)
    }

    /// Drives an asynchronous retry on the tokio runtime.
    ///
    /// The returned handle can be awaited, cancelled and observed. Must be
    /// called from within a runtime.
    pub fn spawn_with_result<T, E, F, Fut>(
        &self,
        options: &RetryOptions,
        supplier: F,
    ) -> RetryHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + fmt::Display + Send + 'static,
    {
        RetryHandle::spawn(options, supplier)
    }
}

impl Default for Retryer {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
