//! RPC status model.
//!
//! Every failed service call is reported as a [`Status`]: a [`Code`] from the
//! standard RPC code set, a human-readable message and, optionally, the type
//! name of a structured failure detail (for example
//! `WorkflowExecutionAlreadyStartedFailure`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use turboflow_core::retry::{Classify, ErrorMatcher};

use crate::error::ProtocolError;

/// RPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum Code {
    /// Not an error.
    Ok = 0,
    /// The call was cancelled, typically by the caller.
    Cancelled = 1,
    /// Unknown error.
    Unknown = 2,
    /// The client specified an invalid argument.
    InvalidArgument = 3,
    /// The deadline expired before the call could complete.
    DeadlineExceeded = 4,
    /// A requested entity was not found.
    NotFound = 5,
    /// The entity a client attempted to create already exists.
    AlreadyExists = 6,
    /// The caller lacks permission for the operation.
    PermissionDenied = 7,
    /// A resource, such as a per-namespace quota, has been exhausted.
    ResourceExhausted = 8,
    /// The system is not in a state required for the operation.
    FailedPrecondition = 9,
    /// The operation was aborted, typically due to a concurrency conflict.
    Aborted = 10,
    /// The operation was attempted past the valid range.
    OutOfRange = 11,
    /// The operation is not implemented by the service.
    Unimplemented = 12,
    /// Internal error.
    Internal = 13,
    /// The service is currently unavailable.
    Unavailable = 14,
    /// Unrecoverable data loss or corruption.
    DataLoss = 15,
    /// The request lacks valid authentication credentials.
    Unauthenticated = 16,
}

impl Code {
    /// Every code, in numeric order.
    pub const ALL: [Code; 17] = [
        Self::Ok,
        Self::Cancelled,
        Self::Unknown,
        Self::InvalidArgument,
        Self::DeadlineExceeded,
        Self::NotFound,
        Self::AlreadyExists,
        Self::PermissionDenied,
        Self::ResourceExhausted,
        Self::FailedPrecondition,
        Self::Aborted,
        Self::OutOfRange,
        Self::Unimplemented,
        Self::Internal,
        Self::Unavailable,
        Self::DataLoss,
        Self::Unauthenticated,
    ];

    /// Canonical upper-snake name, e.g. `"NOT_FOUND"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Code {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownCode(s.to_string()))
    }
}

impl TryFrom<i32> for Code {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .ok_or(ProtocolError::CodeOutOfRange(value))
    }
}

impl From<Code> for ErrorMatcher {
    fn from(code: Code) -> Self {
        ErrorMatcher::code(code.as_str())
    }
}

/// Outcome of a failed service call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct Status {
    code: Code,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details_type: Option<String>,
}

impl Status {
    /// Creates a status without failure details.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details_type: None,
        }
    }

    /// Attach the type name of the structured failure detail.
    pub fn with_details_type(mut self, details_type: impl Into<String>) -> Self {
        self.details_type = Some(details_type.into());
        self
    }

    /// `CANCELLED` status.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    /// `DEADLINE_EXCEEDED` status.
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// `NOT_FOUND` status.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// `UNAVAILABLE` status.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// `INTERNAL` status.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    /// The status code.
    pub fn status_code(&self) -> Code {
        self.code
    }

    /// The message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The failure detail type name, if any.
    pub fn details_type(&self) -> Option<&str> {
        self.details_type.as_deref()
    }
}

impl Classify for Status {
    fn code(&self) -> &str {
        self.code.as_str()
    }

    fn detail_type(&self) -> Option<&str> {
        self.details_type.as_deref()
    }

    fn is_cancelled(&self) -> bool {
        self.code == Code::Cancelled
    }

    fn is_deadline_exceeded(&self) -> bool {
        self.code == Code::DeadlineExceeded
    }
}

/// Codes that are never worth retrying against the orchestration service.
///
/// These report a problem with the request itself, not with the service's
/// availability, so repeating the request cannot change the outcome.
pub fn default_do_not_retry() -> Vec<ErrorMatcher> {
    [
        Code::InvalidArgument,
        Code::NotFound,
        Code::AlreadyExists,
        Code::FailedPrecondition,
        Code::PermissionDenied,
        Code::Unauthenticated,
        Code::Unimplemented,
    ]
    .into_iter()
    .map(ErrorMatcher::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use turboflow_core::retry::{ErrorClassifier, RetryDisposition};

    use super::*;

    #[test]
    fn test_code_names_round_trip() {
        for code in Code::ALL {
            assert_eq!(code.as_str().parse::<Code>().unwrap(), code);
            assert_eq!(Code::try_from(code as i32).unwrap(), code);
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert_eq!(
            "TEAPOT".parse::<Code>().unwrap_err(),
            ProtocolError::UnknownCode("TEAPOT".to_string())
        );
        assert_eq!(
            Code::try_from(17).unwrap_err(),
            ProtocolError::CodeOutOfRange(17)
        );
        assert_eq!(
            Code::try_from(-1).unwrap_err(),
            ProtocolError::CodeOutOfRange(-1)
        );
    }

    #[test]
    fn test_code_serde_uses_canonical_names() {
        assert_eq!(
            serde_json::to_string(&Code::FailedPrecondition).unwrap(),
            r#""FAILED_PRECONDITION""#
        );
        assert_eq!(
            serde_json::from_str::<Code>(r#""RESOURCE_EXHAUSTED""#).unwrap(),
            Code::ResourceExhausted
        );
    }

    #[test]
    fn test_status_display() {
        let status = Status::unavailable("connection reset");
        assert_eq!(status.to_string(), "UNAVAILABLE: connection reset");
    }

    #[rstest]
    #[case::unavailable(Code::Unavailable, RetryDisposition::Retryable)]
    #[case::resource_exhausted(Code::ResourceExhausted, RetryDisposition::Retryable)]
    #[case::internal(Code::Internal, RetryDisposition::Retryable)]
    #[case::deadline(Code::DeadlineExceeded, RetryDisposition::Retryable)]
    #[case::cancelled(Code::Cancelled, RetryDisposition::Cancelled)]
    #[case::invalid_argument(Code::InvalidArgument, RetryDisposition::NonRetryable)]
    #[case::not_found(Code::NotFound, RetryDisposition::NonRetryable)]
    #[case::already_exists(Code::AlreadyExists, RetryDisposition::NonRetryable)]
    #[case::failed_precondition(Code::FailedPrecondition, RetryDisposition::NonRetryable)]
    #[case::permission_denied(Code::PermissionDenied, RetryDisposition::NonRetryable)]
    #[case::unauthenticated(Code::Unauthenticated, RetryDisposition::NonRetryable)]
    #[case::unimplemented(Code::Unimplemented, RetryDisposition::NonRetryable)]
    fn test_default_table_classification(#[case] code: Code, #[case] expected: RetryDisposition) {
        let table = default_do_not_retry();
        let classifier = ErrorClassifier::new(&table);

        assert_eq!(
            classifier.classify(&Status::new(code, "test"), false),
            expected
        );
    }

    #[test]
    fn test_deadline_status_terminal_once_overall_deadline_passed() {
        let table = default_do_not_retry();
        let classifier = ErrorClassifier::new(&table);

        assert_eq!(
            classifier.classify(&Status::deadline_exceeded("attempt timed out"), true),
            RetryDisposition::DeadlineExceeded
        );
    }

    #[test]
    fn test_details_type_drives_detail_matchers() {
        let matchers = [ErrorMatcher::with_detail(
            "ALREADY_EXISTS",
            "WorkflowExecutionAlreadyStartedFailure",
        )];
        let classifier = ErrorClassifier::new(&matchers);

        let duplicate = Status::new(Code::AlreadyExists, "already started")
            .with_details_type("WorkflowExecutionAlreadyStartedFailure");
        let other = Status::new(Code::AlreadyExists, "namespace exists");

        assert_eq!(
            classifier.classify(&duplicate, false),
            RetryDisposition::NonRetryable
        );
        assert_eq!(classifier.classify(&other, false), RetryDisposition::Retryable);
    }

    #[test]
    fn test_status_serde_omits_missing_details() {
        let json = serde_json::to_string(&Status::not_found("gone")).unwrap();
        assert_eq!(json, r#"{"code":"NOT_FOUND","message":"gone"}"#);
    }
}
