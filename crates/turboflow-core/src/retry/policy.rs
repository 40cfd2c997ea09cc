//! Retry policy: backoff shape and loop bounds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::classifier::ErrorMatcher;
use crate::error::ConfigurationError;

/// Multiple of the initial interval used as the backoff cap when no
/// maximum interval is configured.
pub const DEFAULT_MAXIMUM_INTERVAL_COEFFICIENT: u32 = 100;

/// Default jitter fraction.
pub const DEFAULT_JITTER: f64 = 0.1;

const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_BACKOFF_COEFFICIENT: f64 = 2.0;

/// Immutable retry configuration, validated at construction.
///
/// The backoff before attempt `n + 1` is
///
/// ```text
/// base(n)  = initial_interval * backoff_coefficient ^ (n - 1)
/// delay(n) = min(base(n), maximum_interval, remaining budget)
/// sleep(n) = delay(n) * (1 - jitter * random[0, 1))
/// ```
///
/// Jitter only ever shortens a delay, so no sleep exceeds the maximum
/// interval or the remaining budget.
///
/// A policy is shared read-only across invocations, usually behind an `Arc`.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use turboflow_core::retry::RetryPolicy;
///
/// let policy = RetryPolicy::builder()
///     .initial_interval(Duration::from_millis(100))
///     .backoff_coefficient(2.0)
///     .maximum_attempts(5)
///     .build()
///     .unwrap();
///
/// assert_eq!(policy.base_delay(3), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    initial_interval: Duration,
    backoff_coefficient: f64,
    maximum_interval: Option<Duration>,
    maximum_attempts: u32,
    expiration: Option<Duration>,
    do_not_retry: Vec<ErrorMatcher>,
    jitter: f64,
}

impl RetryPolicy {
    /// Creates a builder with the default backoff shape and no bounds.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Delay before the second attempt.
    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Growth multiplier applied per attempt.
    pub fn backoff_coefficient(&self) -> f64 {
        self.backoff_coefficient
    }

    /// Cap applied to every backoff delay.
    ///
    /// Falls back to [`DEFAULT_MAXIMUM_INTERVAL_COEFFICIENT`] times the
    /// initial interval when none was configured.
    pub fn maximum_interval(&self) -> Duration {
        self.maximum_interval.unwrap_or_else(|| {
            self.initial_interval
                .saturating_mul(DEFAULT_MAXIMUM_INTERVAL_COEFFICIENT)
        })
    }

    /// The explicitly configured cap, if any.
    pub fn configured_maximum_interval(&self) -> Option<Duration> {
        self.maximum_interval
    }

    /// Maximum number of attempts; 0 means unlimited.
    pub fn maximum_attempts(&self) -> u32 {
        self.maximum_attempts
    }

    /// Total retry time measured from the first attempt.
    pub fn expiration(&self) -> Option<Duration> {
        self.expiration
    }

    /// Error categories that are never retried.
    pub fn do_not_retry(&self) -> &[ErrorMatcher] {
        &self.do_not_retry
    }

    /// Jitter fraction in `[0.0, 1.0]`.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Returns `true` if the policy alone bounds the retry loop.
    ///
    /// The maximum interval does not count: it caps a single delay, not the
    /// number of delays.
    pub fn is_bounded(&self) -> bool {
        self.maximum_attempts > 0 || self.expiration.is_some()
    }

    /// Checks the backoff shape.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when an interval is zero, the
    /// coefficient is below 1.0 or not finite, the maximum interval is
    /// shorter than the initial one, or the jitter is out of range.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.initial_interval.is_zero() {
            return Err(ConfigurationError::ZeroInitialInterval);
        }
        if !self.backoff_coefficient.is_finite() || self.backoff_coefficient < 1.0 {
            return Err(ConfigurationError::InvalidBackoffCoefficient(
                self.backoff_coefficient,
            ));
        }
        if let Some(maximum) = self.maximum_interval
            && maximum < self.initial_interval
        {
            return Err(ConfigurationError::MaximumIntervalTooShort {
                initial: self.initial_interval,
                maximum,
            });
        }
        if self.expiration.is_some_and(|e| e.is_zero()) {
            return Err(ConfigurationError::ZeroExpiration);
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigurationError::InvalidJitter(self.jitter));
        }
        Ok(())
    }

    /// Checks that the retry loop terminates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Unbounded`] when neither the policy nor
    /// an external deadline bounds the loop.
    pub fn validate_bounded(&self, has_deadline: bool) -> Result<(), ConfigurationError> {
        if self.is_bounded() || has_deadline {
            Ok(())
        } else {
            Err(ConfigurationError::Unbounded)
        }
    }

    /// Un-jittered backoff following failed attempt `attempt` (1-indexed),
    /// capped at the maximum interval.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let maximum = self.maximum_interval();
        let nanos = self.initial_interval.as_nanos() as f64 * self.backoff_coefficient.powi(exponent);
        if nanos >= maximum.as_nanos() as f64 {
            maximum
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }

    /// Applies jitter to `delay`, shortening it by up to `jitter` of its length.
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter == 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = 1.0 - self.jitter * rand::random::<f64>();
        delay.mul_f64(factor)
    }
}

impl Default for RetryPolicy {
    /// Policy used for service calls when nothing else is configured.
    ///
    /// Defaults:
    /// - `initial_interval`: 100ms
    /// - `backoff_coefficient`: 2.0
    /// - `maximum_interval`: 10s
    /// - `maximum_attempts`: unlimited
    /// - `expiration`: 60s
    /// - `jitter`: 0.1
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            backoff_coefficient: DEFAULT_BACKOFF_COEFFICIENT,
            maximum_interval: Some(Duration::from_secs(10)),
            maximum_attempts: 0,
            expiration: Some(Duration::from_secs(60)),
            do_not_retry: Vec::new(),
            jitter: DEFAULT_JITTER,
        }
    }
}

/// Builder for [`RetryPolicy`].
///
/// Starts from the default backoff shape with no bounds; at least one of
/// [`maximum_attempts`](Self::maximum_attempts), [`expiration`](Self::expiration)
/// or a caller deadline must bound the loop before the policy is used.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use turboflow_core::retry::{ErrorMatcher, RetryPolicy};
///
/// let policy = RetryPolicy::builder()
///     .initial_interval(Duration::from_millis(50))
///     .maximum_interval(Duration::from_secs(5))
///     .expiration(Duration::from_secs(30))
///     .do_not_retry(ErrorMatcher::code("NOT_FOUND"))
///     .jitter(0.2)
///     .build()
///     .unwrap();
///
/// assert!(policy.is_bounded());
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    initial_interval: Duration,
    backoff_coefficient: f64,
    maximum_interval: Option<Duration>,
    maximum_attempts: u32,
    expiration: Option<Duration>,
    do_not_retry: Vec<ErrorMatcher>,
    jitter: f64,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            backoff_coefficient: DEFAULT_BACKOFF_COEFFICIENT,
            maximum_interval: None,
            maximum_attempts: 0,
            expiration: None,
            do_not_retry: Vec::new(),
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicyBuilder {
    /// Set the delay before the second attempt.
    ///
    /// Default: 100ms
    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the growth multiplier.
    ///
    /// Default: 2.0
    pub fn backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    /// Cap every backoff delay.
    ///
    /// Default: 100 times the initial interval
    pub fn maximum_interval(mut self, interval: Duration) -> Self {
        self.maximum_interval = Some(interval);
        self
    }

    /// Limit the number of attempts; 0 means unlimited.
    ///
    /// Default: 0
    pub fn maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = attempts;
        self
    }

    /// Bound the total retry time, measured from the first attempt.
    ///
    /// Default: none
    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Add one category that must never be retried.
    pub fn do_not_retry(mut self, matcher: ErrorMatcher) -> Self {
        if !self.do_not_retry.contains(&matcher) {
            self.do_not_retry.push(matcher);
        }
        self
    }

    /// Add several categories that must never be retried.
    pub fn do_not_retry_all(mut self, matchers: impl IntoIterator<Item = ErrorMatcher>) -> Self {
        for matcher in matchers {
            self = self.do_not_retry(matcher);
        }
        self
    }

    /// Set the jitter fraction.
    ///
    /// Default: 0.1
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build and validate the policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the backoff shape is invalid.
    /// Boundedness is checked later, together with the caller deadline.
    pub fn build(self) -> Result<RetryPolicy, ConfigurationError> {
        let policy = RetryPolicy {
            initial_interval: self.initial_interval,
            backoff_coefficient: self.backoff_coefficient,
            maximum_interval: self.maximum_interval,
            maximum_attempts: self.maximum_attempts,
            expiration: self.expiration,
            do_not_retry: self.do_not_retry,
            jitter: self.jitter,
        };
        policy.validate()?;
        Ok(policy)
    }
}

impl From<RetryPolicy> for RetryPolicyBuilder {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            initial_interval: policy.initial_interval,
            backoff_coefficient: policy.backoff_coefficient,
            maximum_interval: policy.maximum_interval,
            maximum_attempts: policy.maximum_attempts,
            expiration: policy.expiration,
            do_not_retry: policy.do_not_retry,
            jitter: policy.jitter,
        }
    }
}

/// Serializable form of [`RetryPolicy`], with millisecond fields.
///
/// Converting a policy rounds its durations up to whole milliseconds.
/// Missing fields take the values of [`RetryPolicy::default`].
///
/// ```rust
/// use turboflow_core::retry::{RetryPolicy, RetryPolicyConfig};
///
/// let config: RetryPolicyConfig = toml::from_str(
///     r#"
///     initial_interval_ms = 200
///     maximum_attempts = 4
///     "#,
/// )
/// .unwrap();
///
/// let policy = RetryPolicy::try_from(config).unwrap();
/// assert_eq!(policy.maximum_attempts(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    /// Initial interval in milliseconds.
    pub initial_interval_ms: u64,
    /// Backoff coefficient.
    pub backoff_coefficient: f64,
    /// Maximum interval in milliseconds.
    pub maximum_interval_ms: Option<u64>,
    /// Maximum attempts; 0 means unlimited.
    pub maximum_attempts: u32,
    /// Expiration in milliseconds.
    pub expiration_ms: Option<u64>,
    /// Jitter fraction.
    pub jitter: f64,
    /// Categories never retried.
    pub do_not_retry: Vec<ErrorMatcher>,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self::from(&RetryPolicy::default())
    }
}

impl From<&RetryPolicy> for RetryPolicyConfig {
    fn from(policy: &RetryPolicy) -> Self {
        Self {
            initial_interval_ms: whole_millis(policy.initial_interval),
            backoff_coefficient: policy.backoff_coefficient,
            maximum_interval_ms: policy.maximum_interval.map(whole_millis),
            maximum_attempts: policy.maximum_attempts,
            expiration_ms: policy.expiration.map(whole_millis),
            jitter: policy.jitter,
            do_not_retry: policy.do_not_retry.clone(),
        }
    }
}

/// Rounds up to whole milliseconds, saturating, so a valid policy stays valid.
fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

impl TryFrom<RetryPolicyConfig> for RetryPolicy {
    type Error = ConfigurationError;

    fn try_from(config: RetryPolicyConfig) -> Result<Self, Self::Error> {
        let mut builder = RetryPolicy::builder()
            .initial_interval(Duration::from_millis(config.initial_interval_ms))
            .backoff_coefficient(config.backoff_coefficient)
            .maximum_attempts(config.maximum_attempts)
            .jitter(config.jitter)
            .do_not_retry_all(config.do_not_retry);
        if let Some(ms) = config.maximum_interval_ms {
            builder = builder.maximum_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = config.expiration_ms {
            builder = builder.expiration(Duration::from_millis(ms));
        }
        builder.build()
    }
}
