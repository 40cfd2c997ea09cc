//! The per-failure decision shared by the blocking and non-blocking executors.

use std::time::Duration;

use tokio::time::Instant;

use super::classifier::{Classify, ErrorClassifier, RetryDisposition};
use super::deadline::{Backoff, DeadlineCoordinator, RetryInvocation};
use super::policy::RetryPolicy;
use crate::error::RetryError;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Sleep this long (already jittered), then try again.
    Retry(Duration),
    /// Settle the invocation.
    Stop(Stop),
}

/// Why the invocation settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    NonRetryable,
    AttemptsExhausted,
    DeadlineExceeded,
    Cancelled,
}

impl Stop {
    pub(crate) fn into_error<E>(self, error: E, attempts: u32, elapsed: Duration) -> RetryError<E> {
        match self {
            Self::NonRetryable => RetryError::NonRetryable {
                source: error,
                attempts,
                elapsed,
            },
            Self::AttemptsExhausted => RetryError::AttemptsExhausted {
                source: error,
                attempts,
                elapsed,
            },
            Self::DeadlineExceeded => RetryError::DeadlineExceeded {
                last_error: Some(error),
                attempts,
                elapsed,
            },
            Self::Cancelled => RetryError::Cancelled {
                last_error: Some(error),
                attempts,
                elapsed,
            },
        }
    }
}

/// Classifies `error` and decides between another attempt and settlement.
///
/// Terminal dispositions win, then the attempt limit, then the deadline.
pub(crate) fn decide<E: Classify + ?Sized>(
    policy: &RetryPolicy,
    coordinator: &DeadlineCoordinator,
    invocation: &RetryInvocation,
    error: &E,
    now: Instant,
) -> Step {
    let expired = coordinator.remaining_budget(invocation, now).is_expired();
    match ErrorClassifier::for_policy(policy).classify(error, expired) {
        RetryDisposition::NonRetryable => return Step::Stop(Stop::NonRetryable),
        RetryDisposition::DeadlineExceeded => return Step::Stop(Stop::DeadlineExceeded),
        RetryDisposition::Cancelled => return Step::Stop(Stop::Cancelled),
        RetryDisposition::Retryable => {}
    }

    if coordinator.is_attempts_exhausted(invocation, policy) {
        return Step::Stop(Stop::AttemptsExhausted);
    }

    match coordinator.next_backoff(invocation, policy, now) {
        Backoff::Sleep(delay) => Step::Retry(policy.jittered(delay)),
        Backoff::DeadlineReached => Step::Stop(Stop::DeadlineExceeded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{Deadline, ErrorMatcher};

    struct Code(&'static str);

    impl Classify for Code {
        fn code(&self) -> &str {
            self.0
        }

        fn is_cancelled(&self) -> bool {
            self.0 == "CANCELLED"
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::builder()
            .initial_interval(Duration::from_millis(100))
            .maximum_attempts(3)
            .do_not_retry(ErrorMatcher::code("NOT_FOUND"))
            .jitter(0.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_retryable_error_sleeps() {
        let now = Instant::now();
        let policy = policy();
        let coordinator = DeadlineCoordinator::default();
        let invocation = coordinator.begin(&policy, now);

        assert_eq!(
            decide(&policy, &coordinator, &invocation, &Code("UNAVAILABLE"), now),
            Step::Retry(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_terminal_dispositions_stop() {
        let now = Instant::now();
        let policy = policy();
        let coordinator = DeadlineCoordinator::default();
        let invocation = coordinator.begin(&policy, now);

        assert_eq!(
            decide(&policy, &coordinator, &invocation, &Code("NOT_FOUND"), now),
            Step::Stop(Stop::NonRetryable)
        );
        assert_eq!(
            decide(&policy, &coordinator, &invocation, &Code("CANCELLED"), now),
            Step::Stop(Stop::Cancelled)
        );
    }

    #[test]
    fn test_exhaustion_checked_before_deadline() {
        let now = Instant::now();
        let policy = policy();
        let coordinator = DeadlineCoordinator::new(Some(Deadline::at(now)));
        let mut invocation = coordinator.begin(&policy, now);
        invocation.advance();
        invocation.advance();

        assert_eq!(
            decide(&policy, &coordinator, &invocation, &Code("UNAVAILABLE"), now),
            Step::Stop(Stop::AttemptsExhausted)
        );
    }

    #[test]
    fn test_elapsed_deadline_stops_retryable_error() {
        let now = Instant::now();
        let policy = policy();
        let coordinator = DeadlineCoordinator::new(Some(Deadline::at(now)));
        let invocation = coordinator.begin(&policy, now);

        assert_eq!(
            decide(&policy, &coordinator, &invocation, &Code("UNAVAILABLE"), now),
            Step::Stop(Stop::DeadlineExceeded)
        );
    }
}
