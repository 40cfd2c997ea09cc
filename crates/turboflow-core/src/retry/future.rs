//! Non-blocking retry executor.
//!
//! [`RetryFuture`] is a hand-written state machine:
//!
//! ```text
//! Idle -> Attempt -> Backoff -> Attempt -> ... -> Settled
//! ```
//!
//! Attempts are polled in place and backoff waits are tokio timers, so no
//! thread is ever parked on behalf of an invocation.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, warn};

use super::classifier::Classify;
use super::deadline::{DeadlineCoordinator, RetryInvocation};
use super::decision::{Step, decide};
use super::policy::RetryPolicy;
use super::retryer::RetryOptions;
use crate::error::RetryError;

/// Shared view of how many attempts an invocation has issued.
///
/// Cloned into [`RetryHandle`] so progress can be observed while the retry
/// runs on another task.
#[derive(Debug, Clone, Default)]
pub struct RetryProgress {
    attempts: Arc<AtomicU32>,
}

impl RetryProgress {
    /// Attempts started so far, including one still in flight.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    fn record_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel) + 1
    }
}

enum State<Fut> {
    Idle,
    Attempt {
        attempt: Pin<Box<Fut>>,
        invocation: RetryInvocation,
    },
    Backoff {
        sleep: Pin<Box<Sleep>>,
        invocation: RetryInvocation,
    },
    Settled,
}

impl<Fut> State<Fut> {
    fn invocation(&self) -> Option<&RetryInvocation> {
        match self {
            Self::Attempt { invocation, .. } | Self::Backoff { invocation, .. } => Some(invocation),
            Self::Idle | Self::Settled => None,
        }
    }
}

/// Future returned by the non-blocking retry operations.
///
/// Lazy like every future: the first attempt starts on the first poll, and
/// the expiration clock starts with it. Dropping the future abandons the
/// in-flight attempt and any pending backoff timer.
#[must_use = "futures do nothing unless polled"]
pub struct RetryFuture<F, Fut, T, E> {
    supplier: F,
    policy: Arc<RetryPolicy>,
    coordinator: DeadlineCoordinator,
    state: State<Fut>,
    last_error: Option<E>,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    progress: RetryProgress,
    _output: PhantomData<fn() -> T>,
}

// Attempt futures and timers are boxed; nothing is pinned in place.
impl<F, Fut, T, E> Unpin for RetryFuture<F, Fut, T, E> {}

impl<F, Fut, T, E> RetryFuture<F, Fut, T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    pub(crate) fn new(options: &RetryOptions, supplier: F) -> Self {
        Self {
            supplier,
            policy: Arc::clone(options.policy_arc()),
            coordinator: options.coordinator(),
            state: State::Idle,
            last_error: None,
            cancelled: options
                .cancellation()
                .map(|token| Box::pin(token.clone().cancelled_owned())),
            progress: RetryProgress::default(),
            _output: PhantomData,
        }
    }

    /// Attempt counter shared with any observer.
    pub fn progress(&self) -> RetryProgress {
        self.progress.clone()
    }

    fn start_attempt(&mut self, invocation: RetryInvocation) -> State<Fut> {
        let issued = self.progress.record_attempt();
        debug!(attempt = issued, "starting attempt");
        State::Attempt {
            attempt: Box::pin((self.supplier)()),
            invocation,
        }
    }

    fn settle_cancelled(&mut self) -> RetryError<E> {
        let state = mem::replace(&mut self.state, State::Settled);
        let elapsed = state
            .invocation()
            .map_or(Duration::ZERO, |invocation| invocation.elapsed(Instant::now()));
        // Dropping the state abandons the in-flight attempt or the timer.
        drop(state);
        self.cancelled = None;

        let attempts = self.progress.attempts();
        debug!(attempts, ?elapsed, "retry cancelled");
        RetryError::Cancelled {
            last_error: self.last_error.take(),
            attempts,
            elapsed,
        }
    }
}

impl<F, Fut, T, E> Future for RetryFuture<F, Fut, T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    type Output = Result<T, RetryError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if matches!(this.state, State::Settled) {
            panic!("RetryFuture polled after completion");
        }

        if let Some(cancelled) = this.cancelled.as_mut()
            && cancelled.as_mut().poll(cx).is_ready()
        {
            return Poll::Ready(Err(this.settle_cancelled()));
        }

        loop {
            match mem::replace(&mut this.state, State::Settled) {
                State::Idle => {
                    let invocation = this.coordinator.begin(&this.policy, Instant::now());
                    this.state = this.start_attempt(invocation);
                }
                State::Attempt {
                    mut attempt,
                    invocation,
                } => {
                    let error = match attempt.as_mut().poll(cx) {
                        Poll::Pending => {
                            this.state = State::Attempt {
                                attempt,
                                invocation,
                            };
                            return Poll::Pending;
                        }
                        Poll::Ready(Ok(value)) => {
                            if invocation.attempt() > 1 {
                                debug!(attempt = invocation.attempt(), "call succeeded after retries");
                            }
                            this.cancelled = None;
                            return Poll::Ready(Ok(value));
                        }
                        Poll::Ready(Err(error)) => error,
                    };
                    drop(attempt);

                    let now = Instant::now();
                    let number = invocation.attempt();
                    match decide(&this.policy, &this.coordinator, &invocation, &error, now) {
                        Step::Retry(delay) => {
                            debug!(attempt = number, ?delay, error = %error, "call failed, retrying");
                            this.last_error = Some(error);
                            this.state = State::Backoff {
                                sleep: Box::pin(tokio::time::sleep(delay)),
                                invocation,
                            };
                        }
                        Step::Stop(stop) => {
                            let elapsed = invocation.elapsed(now);
                            if number > 1 {
                                warn!(attempt = number, ?elapsed, ?stop, error = %error, "giving up on call");
                            } else {
                                debug!(?stop, error = %error, "call failed");
                            }
                            this.last_error = None;
                            this.cancelled = None;
                            return Poll::Ready(Err(stop.into_error(error, number, elapsed)));
                        }
                    }
                }
                State::Backoff {
                    mut sleep,
                    mut invocation,
                } => {
                    if sleep.as_mut().poll(cx).is_pending() {
                        this.state = State::Backoff { sleep, invocation };
                        return Poll::Pending;
                    }
                    invocation.advance();
                    this.state = this.start_attempt(invocation);
                }
                State::Settled => unreachable!("settled state is checked before the loop"),
            }
        }
    }
}

impl<F, Fut, T, E> fmt::Debug for RetryFuture<F, Fut, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Idle => "idle",
            State::Attempt { .. } => "attempt",
            State::Backoff { .. } => "backoff",
            State::Settled => "settled",
        };
        f.debug_struct("RetryFuture")
            .field("state", &state)
            .field("attempts", &self.progress.attempts())
            .finish_non_exhaustive()
    }
}

/// Handle to a retry driven on the tokio runtime.
///
/// Awaiting the handle yields the retry outcome. Dropping it cancels the
/// retry.
#[derive(Debug)]
pub struct RetryHandle<T, E> {
    join: JoinHandle<Result<T, RetryError<E>>>,
    cancel: CancellationToken,
    progress: RetryProgress,
    started: Instant,
}

impl<T, E> RetryHandle<T, E>
where
    T: Send + 'static,
    E: Classify + fmt::Display + Send + 'static,
{
    /// Spawns `supplier` under the retry loop.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn<F, Fut>(options: &RetryOptions, supplier: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let cancel = options
            .cancellation()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let options = options.clone().with_cancellation(cancel.clone());

        let future = RetryFuture::new(&options, supplier);
        let progress = future.progress();
        Self {
            join: tokio::spawn(future),
            cancel,
            progress,
            started: Instant::now(),
        }
    }
}

impl<T, E> RetryHandle<T, E> {
    /// Requests cancellation.
    ///
    /// A pending backoff timer is dropped without another attempt; an
    /// in-flight attempt is abandoned. No-op once the retry has settled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.progress.attempts()
    }

    /// Returns `true` once the retry has settled.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl<T, E> Future for RetryHandle<T, E> {
    type Output = Result<T, RetryError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.join).poll(cx)) {
            Ok(outcome) => Poll::Ready(outcome),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            // The runtime shut down underneath the task.
            Err(_) => Poll::Ready(Err(RetryError::Cancelled {
                last_error: None,
                attempts: this.progress.attempts(),
                elapsed: this.started.elapsed(),
            })),
        }
    }
}

impl<T, E> Drop for RetryHandle<T, E> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
