//! Shared protocol types for the TurboFlow orchestration service
//!
//! This crate defines what travels between the client runtime and the
//! orchestration service: the RPC status model every failed call is reported
//! with, and the request/response payloads of the service methods the client
//! exposes. The transport itself lives elsewhere.
//!
//! # Type Organization
//!
//! - **Status model**: [`status`] - status codes, call status, default do-not-retry table
//! - **Service payloads**: [`service`] - requests and responses per RPC
//! - **Error types**: [`error`] - protocol errors
//!
//! # Design Principles
//!
//! - **Zero I/O**: All types are pure data structures
//! - **Serialization**: serde-based; payload bodies are opaque JSON values
//! - **Classification**: [`Status`] implements the retry engine's `Classify`
//!   trait, so any call returning it can be retried directly

#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! # Usage
//!
//! ```rust
//! use turboflow_core::retry::{Classify, ErrorClassifier, RetryDisposition};
//! use turboflow_protocol::{Code, Status, default_do_not_retry};
//!
//! let table = default_do_not_retry();
//! let classifier = ErrorClassifier::new(&table);
//!
//! let status = Status::new(Code::NotFound, "namespace default not found");
//! assert_eq!(status.code(), "NOT_FOUND");
//! assert_eq!(classifier.classify(&status, false), RetryDisposition::NonRetryable);
//! ```

pub mod error;
pub mod service;
pub mod status;

// Re-export commonly used types at crate level
pub use error::{ProtocolError, Result};
pub use service::{
    Command, DescribeNamespaceRequest, DescribeNamespaceResponse,
    GetWorkflowExecutionHistoryRequest, GetWorkflowExecutionHistoryResponse, HistoryEvent,
    PollWorkflowTaskQueueRequest, PollWorkflowTaskQueueResponse,
    RespondWorkflowTaskCompletedRequest, RespondWorkflowTaskCompletedResponse,
    SignalWorkflowExecutionRequest, SignalWorkflowExecutionResponse,
    StartWorkflowExecutionRequest, StartWorkflowExecutionResponse, WorkflowExecution,
};
pub use status::{Code, Status, default_do_not_retry};
