//! Deadline merging and remaining-budget calculation.
//!
//! A retry invocation may be bounded by two clocks at once: a deadline handed
//! down by the caller (propagated from an enclosing call chain) and the
//! policy's expiration, measured from the first attempt. The coordinator folds
//! both into one effective deadline and derives every timing decision from it.

use std::time::Duration;

use tokio::time::Instant;

use super::policy::RetryPolicy;

/// An absolute point in time after which no further attempts are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline at a fixed instant.
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self::after_from(Instant::now(), timeout)
    }

    /// Deadline `timeout` after `start`, saturating far in the future on overflow.
    pub fn after_from(start: Instant, timeout: Duration) -> Self {
        // Roughly thirty years; keeps the instant arithmetic from overflowing.
        const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
        Self(start + timeout.min(FAR_FUTURE))
    }

    /// The underlying instant.
    pub fn instant(self) -> Instant {
        self.0
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(self, now: Instant) -> Duration {
        self.0.saturating_duration_since(now)
    }

    /// Returns `true` once `now` has reached the deadline.
    pub fn is_elapsed(self, now: Instant) -> bool {
        now >= self.0
    }
}

impl From<Instant> for Deadline {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

/// Time still available to an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// No deadline applies; only the attempt limit bounds the loop.
    Unbounded,
    /// Time left before the effective deadline.
    Remaining(Duration),
    /// The effective deadline has been reached.
    Expired,
}

impl Budget {
    /// Returns `true` once the effective deadline has been reached.
    pub fn is_expired(self) -> bool {
        matches!(self, Self::Expired)
    }
}

/// Outcome of a backoff computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait this long, then make the next attempt.
    Sleep(Duration),
    /// No time is left for another attempt.
    DeadlineReached,
}

/// Mutable progress of one retry invocation.
///
/// Created when a retry operation begins and discarded when it settles.
/// Never shared between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryInvocation {
    attempt: u32,
    first_attempt_time: Instant,
    effective_deadline: Option<Deadline>,
}

impl RetryInvocation {
    /// The current attempt number, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// When the first attempt started.
    pub fn first_attempt_time(&self) -> Instant {
        self.first_attempt_time
    }

    /// The earliest applicable deadline, if any.
    pub fn effective_deadline(&self) -> Option<Deadline> {
        self.effective_deadline
    }

    /// Time since the first attempt started.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.first_attempt_time)
    }

    pub(crate) fn advance(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
    }
}

/// Merges the caller deadline with policy bounds.
///
/// One coordinator is built per call; it only carries the caller deadline, so
/// it is `Copy` and cheap to pass around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeadlineCoordinator {
    caller_deadline: Option<Deadline>,
}

impl DeadlineCoordinator {
    /// Creates a coordinator for a call with an optional caller deadline.
    pub fn new(caller_deadline: Option<Deadline>) -> Self {
        Self { caller_deadline }
    }

    /// The deadline supplied by the caller, if any.
    pub fn caller_deadline(&self) -> Option<Deadline> {
        self.caller_deadline
    }

    /// Opens a new invocation whose first attempt starts at `now`.
    pub fn begin(&self, policy: &RetryPolicy, now: Instant) -> RetryInvocation {
        RetryInvocation {
            attempt: 1,
            first_attempt_time: now,
            effective_deadline: self.effective_deadline(now, policy),
        }
    }

    /// `min(caller deadline, first attempt + expiration)` over whichever are present.
    pub fn effective_deadline(
        &self,
        first_attempt_time: Instant,
        policy: &RetryPolicy,
    ) -> Option<Deadline> {
        let expiration = policy
            .expiration()
            .map(|expiration| Deadline::after_from(first_attempt_time, expiration));

        match (self.caller_deadline, expiration) {
            (Some(caller), Some(expiration)) => Some(caller.min(expiration)),
            (caller, expiration) => caller.or(expiration),
        }
    }

    /// Time left before the invocation's effective deadline.
    pub fn remaining_budget(&self, invocation: &RetryInvocation, now: Instant) -> Budget {
        match invocation.effective_deadline {
            None => Budget::Unbounded,
            Some(deadline) if deadline.is_elapsed(now) => Budget::Expired,
            Some(deadline) => Budget::Remaining(deadline.remaining(now)),
        }
    }

    /// Returns `true` once the attempt limit has been reached.
    pub fn is_attempts_exhausted(&self, invocation: &RetryInvocation, policy: &RetryPolicy) -> bool {
        policy.maximum_attempts() > 0 && invocation.attempt >= policy.maximum_attempts()
    }

    /// Un-jittered delay before the next attempt, clamped to the remaining budget.
    pub fn next_backoff(
        &self,
        invocation: &RetryInvocation,
        policy: &RetryPolicy,
        now: Instant,
    ) -> Backoff {
        let delay = policy.base_delay(invocation.attempt);
        match self.remaining_budget(invocation, now) {
            Budget::Unbounded => Backoff::Sleep(delay),
            Budget::Expired => Backoff::DeadlineReached,
            Budget::Remaining(remaining) => {
                let clamped = delay.min(remaining);
                if clamped.is_zero() {
                    Backoff::DeadlineReached
                } else {
                    Backoff::Sleep(clamped)
                }
            }
        }
    }
}
