//! Blocking retry executor.
//!
//! Runs entirely on the caller's thread, sleeping through each backoff. That
//! monopolizes the thread for the whole retry duration, so event-loop callers
//! should use [`RetryFuture`](super::RetryFuture) instead.
//!
//! Time is read from the wall clock, never from a paused tokio clock, because
//! the backoff sleeps are real thread sleeps.

use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Wake, Waker};
use std::thread::{self, Thread};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::classifier::Classify;
use super::deadline::DeadlineCoordinator;
use super::decision::{Step, decide};
use super::policy::RetryPolicy;
use crate::error::RetryError;

/// Drives a blocking unit of work through the retry loop.
///
/// Exactly one attempt runs at a time, on the calling thread. Expiration and
/// caller deadlines are checked against the wall clock, so inside a runtime
/// with a paused clock a caller deadline must be built from real time.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use turboflow_core::retry::{Classify, DeadlineCoordinator, RetryPolicy, SyncRetryExecutor};
///
/// #[derive(Debug)]
/// struct Busy;
///
/// impl std::fmt::Display for Busy {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         f.write_str("busy")
///     }
/// }
///
/// impl Classify for Busy {
///     fn code(&self) -> &str {
///         "UNAVAILABLE"
///     }
/// }
///
/// let policy = RetryPolicy::builder()
///     .initial_interval(Duration::from_millis(1))
///     .maximum_attempts(3)
///     .build()
///     .unwrap();
///
/// let mut calls = 0;
/// let result = SyncRetryExecutor::new(&policy, DeadlineCoordinator::default()).execute(|| {
///     calls += 1;
///     if calls < 3 { Err(Busy) } else { Ok(calls) }
/// });
///
/// assert_eq!(result.unwrap(), 3);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SyncRetryExecutor<'a> {
    policy: &'a RetryPolicy,
    coordinator: DeadlineCoordinator,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> SyncRetryExecutor<'a> {
    /// Creates an executor for one invocation.
    pub fn new(policy: &'a RetryPolicy, coordinator: DeadlineCoordinator) -> Self {
        Self {
            policy,
            coordinator,
            cancel: None,
        }
    }

    /// Observe `token`: it is checked before the first attempt and throughout
    /// every backoff sleep.
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Runs `work` until it succeeds or the invocation settles with an error.
    ///
    /// # Errors
    ///
    /// Returns a [`RetryError`] carrying the last error of `work`, the number
    /// of attempts issued and the elapsed time.
    pub fn execute<T, E, F>(self, mut work: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + fmt::Display,
    {
        let mut invocation = self.coordinator.begin(self.policy, wall_clock_now());

        if self.is_cancelled() {
            return Err(RetryError::Cancelled {
                last_error: None,
                attempts: 0,
                elapsed: Duration::ZERO,
            });
        }

        loop {
            let attempt = invocation.attempt();
            let error = match work() {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "call succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let now = wall_clock_now();
            let elapsed = invocation.elapsed(now);
            match decide(self.policy, &self.coordinator, &invocation, &error, now) {
                Step::Retry(delay) => {
                    debug!(attempt, ?delay, error = %error, "call failed, retrying");
                    if !self.sleep(delay) {
                        debug!(attempt, "retry cancelled during backoff");
                        return Err(RetryError::Cancelled {
                            last_error: Some(error),
                            attempts: attempt,
                            elapsed: invocation.elapsed(wall_clock_now()),
                        });
                    }
                    invocation.advance();
                }
                Step::Stop(stop) => {
                    if attempt > 1 {
                        warn!(attempt, ?elapsed, ?stop, error = %error, "giving up on call");
                    } else {
                        debug!(?stop, error = %error, "call failed");
                    }
                    return Err(stop.into_error(error, attempt, elapsed));
                }
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancellationToken::is_cancelled)
    }

    /// Blocks for `delay`; returns `false` if cancelled first.
    ///
    /// The thread parks until the deadline and is unparked by the token's
    /// waker, so cancellation is seen immediately without periodic wakeups.
    fn sleep(&self, delay: Duration) -> bool {
        let Some(token) = self.cancel else {
            thread::sleep(delay);
            return true;
        };

        let waker = Waker::from(Arc::new(ThreadUnparker(thread::current())));
        let mut cx = Context::from_waker(&waker);
        let mut cancelled = pin!(token.cancelled());

        let wake_at = std::time::Instant::now() + delay;
        loop {
            if cancelled.as_mut().poll(&mut cx).is_ready() {
                return false;
            }
            let now = std::time::Instant::now();
            if now >= wake_at {
                return true;
            }
            // Spurious unparks just go round the loop again.
            thread::park_timeout(wake_at - now);
        }
    }
}

/// Waker that unparks the thread blocked in a backoff sleep.
struct ThreadUnparker(Thread);

impl Wake for ThreadUnparker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

/// The wall clock as a tokio instant, unaffected by `tokio::time::pause`.
fn wall_clock_now() -> Instant {
    Instant::from_std(std::time::Instant::now())
}
