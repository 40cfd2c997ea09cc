//! Property-based tests for the retry engine.
//!
//! These verify invariants that must hold for every valid policy:
//! - Computed delays never decrease and never exceed the maximum interval
//! - Jitter only shortens a delay
//! - Clamping to the remaining budget never yields a longer sleep
//! - A policy with `maximum_attempts = N` makes at least one and at most N attempts

use std::cell::Cell;
use std::time::Duration;

use proptest::prelude::*;
use tokio::time::Instant;
use turboflow_core::prelude::*;

#[derive(Debug, thiserror::Error)]
#[error("unavailable")]
struct Unavailable;

impl Classify for Unavailable {
    fn code(&self) -> &str {
        "UNAVAILABLE"
    }
}

/// Generate valid policy parameters.
fn policy_strategy() -> impl Strategy<Value = RetryPolicy> {
    (
        1u64..=5_000u64,                     // initial_ms
        1.0f64..=10.0f64,                    // coefficient
        prop::option::of(1u64..=600_000u64), // maximum_ms
        0u32..=20u32,                        // maximum_attempts
        0.0f64..=1.0f64,                     // jitter
    )
        .prop_filter(
            "maximum interval must not be shorter than initial",
            |(initial_ms, _, maximum_ms, _, _)| maximum_ms.is_none_or(|max| max >= *initial_ms),
        )
        .prop_map(|(initial_ms, coefficient, maximum_ms, attempts, jitter)| {
            let mut builder = RetryPolicy::builder()
                .initial_interval(Duration::from_millis(initial_ms))
                .backoff_coefficient(coefficient)
                .maximum_attempts(attempts)
                .jitter(jitter);
            if let Some(ms) = maximum_ms {
                builder = builder.maximum_interval(Duration::from_millis(ms));
            }
            builder.build().expect("generated policy is valid")
        })
}

proptest! {
    /// Property: un-jittered delays are non-decreasing and capped.
    #[test]
    fn base_delay_monotonic_and_capped(policy in policy_strategy(), attempts in 1u32..=64) {
        let mut previous = Duration::ZERO;
        for attempt in 1..=attempts {
            let delay = policy.base_delay(attempt);
            prop_assert!(delay >= previous, "delay decreased at attempt {}: {:?} < {:?}", attempt, delay, previous);
            prop_assert!(delay <= policy.maximum_interval(), "delay {:?} above cap {:?}", delay, policy.maximum_interval());
            previous = delay;
        }
    }

    /// Property: the first delay equals the initial interval.
    #[test]
    fn first_delay_is_initial_interval(policy in policy_strategy()) {
        prop_assert_eq!(policy.base_delay(1), policy.initial_interval());
    }

    /// Property: jitter stays within `[delay * (1 - jitter), delay]`.
    #[test]
    fn jitter_only_shortens(policy in policy_strategy(), delay_ms in 0u64..=600_000) {
        let delay = Duration::from_millis(delay_ms);
        let jittered = policy.jittered(delay);

        prop_assert!(jittered <= delay);
        let floor = delay.mul_f64(1.0 - policy.jitter());
        // One nanosecond of slack for float rounding.
        prop_assert!(jittered + Duration::from_nanos(1) >= floor, "{:?} below {:?}", jittered, floor);
    }

    /// Property: the coordinator never schedules a sleep past the remaining budget.
    #[test]
    fn backoff_never_exceeds_remaining_budget(
        policy in policy_strategy(),
        budget_ms in 0u64..=10_000,
        elapsed_ms in 0u64..=10_000,
    ) {
        let start = Instant::now();
        let coordinator = DeadlineCoordinator::new(Some(Deadline::after_from(start, Duration::from_millis(budget_ms))));
        let invocation = coordinator.begin(&policy, start);
        let now = start + Duration::from_millis(elapsed_ms);

        match coordinator.next_backoff(&invocation, &policy, now) {
            Backoff::Sleep(delay) => {
                prop_assert!(!delay.is_zero());
                prop_assert!(delay <= policy.base_delay(invocation.attempt()));
                prop_assert!(delay <= Duration::from_millis(budget_ms.saturating_sub(elapsed_ms)));
            }
            Backoff::DeadlineReached => prop_assert!(elapsed_ms >= budget_ms),
        }
    }

    /// Property: `maximum_attempts = N` yields between 1 and N attempts.
    #[test]
    fn attempts_bounded_by_maximum(maximum_attempts in 1u32..=6, succeed_on in 1u32..=10) {
        let policy = RetryPolicy::builder()
            .initial_interval(Duration::from_micros(10))
            .backoff_coefficient(1.0)
            .maximum_attempts(maximum_attempts)
            .build()
            .unwrap();
        let retryer = Retryer::new(policy);
        let options = retryer.options(None).unwrap();
        let calls = Cell::new(0u32);

        let result = retryer.retry_with_result(&options, || {
            calls.set(calls.get() + 1);
            if calls.get() >= succeed_on { Ok(calls.get()) } else { Err(Unavailable) }
        });

        prop_assert!(calls.get() >= 1);
        prop_assert!(calls.get() <= maximum_attempts);
        match result {
            Ok(attempt) => prop_assert_eq!(attempt, succeed_on),
            Err(err) => {
                prop_assert!(succeed_on > maximum_attempts);
                prop_assert_eq!(err.attempts(), maximum_attempts);
            }
        }
    }
}
