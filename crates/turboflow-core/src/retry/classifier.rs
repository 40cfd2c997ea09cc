//! Error classification for retry decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::policy::RetryPolicy;

/// Exposes the category of an error to the classifier.
///
/// Implemented by the call layer's error type (for example an RPC status).
/// The engine never inspects error contents beyond this trait.
pub trait Classify {
    /// Category code, e.g. `"NOT_FOUND"`.
    fn code(&self) -> &str;

    /// Optional finer-grained failure type carried in the error details.
    fn detail_type(&self) -> Option<&str> {
        None
    }

    /// Whether the error denotes an explicit cancellation.
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Whether the error denotes the call exceeding its own per-attempt deadline.
    fn is_deadline_exceeded(&self) -> bool {
        false
    }
}

/// Outcome of classifying one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryDisposition {
    /// Transient failure; another attempt may succeed.
    Retryable,
    /// Retrying would not help.
    NonRetryable,
    /// The effective deadline of the invocation has been reached.
    DeadlineExceeded,
    /// The call was cancelled.
    Cancelled,
}

impl RetryDisposition {
    /// Returns `true` for every disposition that ends the retry loop.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Retryable)
    }
}

impl fmt::Display for RetryDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Retryable => "retryable",
            Self::NonRetryable => "non-retryable",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Matches errors by category code and, optionally, by detail type.
///
/// A matcher without a detail type matches every error with its code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorMatcher {
    /// Category code to match.
    pub code: String,
    /// Detail type to match in addition to the code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_type: Option<String>,
}

impl ErrorMatcher {
    /// Matches every error with `code`.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail_type: None,
        }
    }

    /// Matches errors with `code` whose detail type is `detail_type`.
    pub fn with_detail(code: impl Into<String>, detail_type: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail_type: Some(detail_type.into()),
        }
    }

    /// Returns `true` if `error` falls into this matcher's category.
    pub fn matches<E: Classify + ?Sized>(&self, error: &E) -> bool {
        if error.code() != self.code {
            return false;
        }
        match &self.detail_type {
            None => true,
            Some(detail) => error.detail_type() == Some(detail.as_str()),
        }
    }
}

/// Maps a failed attempt to a [`RetryDisposition`].
///
/// Pure and allocation-free: it only reads the matcher table and the error.
#[derive(Debug, Clone, Copy)]
pub struct ErrorClassifier<'a> {
    do_not_retry: &'a [ErrorMatcher],
}

impl<'a> ErrorClassifier<'a> {
    /// Creates a classifier over an explicit do-not-retry table.
    pub fn new(do_not_retry: &'a [ErrorMatcher]) -> Self {
        Self { do_not_retry }
    }

    /// Creates a classifier over the policy's do-not-retry table.
    pub fn for_policy(policy: &'a RetryPolicy) -> Self {
        Self::new(policy.do_not_retry())
    }

    /// Classifies `error`.
    ///
    /// `deadline_elapsed` tells whether the invocation's effective deadline has
    /// already passed; it only matters for per-attempt deadline errors.
    pub fn classify<E: Classify + ?Sized>(
        &self,
        error: &E,
        deadline_elapsed: bool,
    ) -> RetryDisposition {
        if self.do_not_retry.iter().any(|m| m.matches(error)) {
            return RetryDisposition::NonRetryable;
        }
        if error.is_cancelled() {
            return RetryDisposition::Cancelled;
        }
        if error.is_deadline_exceeded() && deadline_elapsed {
            return RetryDisposition::DeadlineExceeded;
        }
        RetryDisposition::Retryable
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    struct TestError {
        code: &'static str,
        detail: Option<&'static str>,
    }

    impl TestError {
        fn new(code: &'static str) -> Self {
            Self { code, detail: None }
        }

        fn with_detail(code: &'static str, detail: &'static str) -> Self {
            Self {
                code,
                detail: Some(detail),
            }
        }
    }

    impl Classify for TestError {
        fn code(&self) -> &str {
            self.code
        }

        fn detail_type(&self) -> Option<&str> {
            self.detail
        }

        fn is_cancelled(&self) -> bool {
            self.code == "CANCELLED"
        }

        fn is_deadline_exceeded(&self) -> bool {
            self.code == "DEADLINE_EXCEEDED"
        }
    }

    fn table() -> Vec<ErrorMatcher> {
        vec![
            ErrorMatcher::code("NOT_FOUND"),
            ErrorMatcher::with_detail("FAILED_PRECONDITION", "WorkflowExecutionAlreadyStarted"),
        ]
    }

    #[rstest]
    #[case::unavailable("UNAVAILABLE", false, RetryDisposition::Retryable)]
    #[case::not_found("NOT_FOUND", false, RetryDisposition::NonRetryable)]
    #[case::cancelled("CANCELLED", false, RetryDisposition::Cancelled)]
    #[case::cancelled_after_deadline("CANCELLED", true, RetryDisposition::Cancelled)]
    #[case::attempt_deadline("DEADLINE_EXCEEDED", false, RetryDisposition::Retryable)]
    #[case::overall_deadline("DEADLINE_EXCEEDED", true, RetryDisposition::DeadlineExceeded)]
    #[case::internal_after_deadline("INTERNAL", true, RetryDisposition::Retryable)]
    fn test_classify(
        #[case] code: &'static str,
        #[case] deadline_elapsed: bool,
        #[case] expected: RetryDisposition,
    ) {
        let matchers = table();
        let classifier = ErrorClassifier::new(&matchers);

        assert_eq!(
            classifier.classify(&TestError::new(code), deadline_elapsed),
            expected
        );
    }

    #[test]
    fn test_matcher_wins_over_cancellation() {
        let matchers = vec![ErrorMatcher::code("CANCELLED")];
        let classifier = ErrorClassifier::new(&matchers);

        assert_eq!(
            classifier.classify(&TestError::new("CANCELLED"), false),
            RetryDisposition::NonRetryable
        );
    }

    #[test]
    fn test_detail_matcher_requires_detail() {
        let matchers = table();
        let classifier = ErrorClassifier::new(&matchers);

        assert_eq!(
            classifier.classify(&TestError::new("FAILED_PRECONDITION"), false),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classifier.classify(
                &TestError::with_detail("FAILED_PRECONDITION", "WorkflowExecutionAlreadyStarted"),
                false
            ),
            RetryDisposition::NonRetryable
        );
        assert_eq!(
            classifier.classify(
                &TestError::with_detail("FAILED_PRECONDITION", "NamespaceNotActive"),
                false
            ),
            RetryDisposition::Retryable
        );
    }

    #[test]
    fn test_empty_table_retries_everything_but_signals() {
        let classifier = ErrorClassifier::new(&[]);

        assert_eq!(
            classifier.classify(&TestError::new("NOT_FOUND"), false),
            RetryDisposition::Retryable
        );
        assert!(classifier
            .classify(&TestError::new("CANCELLED"), false)
            .is_terminal());
    }

    #[test]
    fn test_matcher_serde_omits_missing_detail() {
        let json = serde_json::to_string(&ErrorMatcher::code("NOT_FOUND")).unwrap();
        assert_eq!(json, r#"{"code":"NOT_FOUND"}"#);

        let parsed: ErrorMatcher =
            serde_json::from_str(r#"{"code":"ALREADY_EXISTS","detail_type":"Dup"}"#).unwrap();
        assert_eq!(parsed, ErrorMatcher::with_detail("ALREADY_EXISTS", "Dup"));
    }
}
