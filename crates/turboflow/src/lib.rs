//! # TurboFlow
//!
//! Rust client for the TurboFlow workflow orchestration service:
//! - Every RPC retried through one policy-driven engine
//! - Caller deadlines merged with the policy expiration
//! - Per-attempt timeouts, with long-poll calls given their own budget
//! - Cooperative cancellation of in-flight calls and backoff waits
//! - Blocking and async clients over a pluggable transport stub
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use turboflow::{CallOptions, ServiceClientConfig, WorkflowServiceClient};
//! use turboflow::turboflow_protocol::StartWorkflowExecutionRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceClientConfig::from_env()?;
//!     let client = WorkflowServiceClient::new(MyTransport::connect(&config.target).await?, config)?;
//!
//!     let started = client
//!         .start_workflow_execution(
//!             StartWorkflowExecutionRequest::new("default", "order-42", "OrderWorkflow", "orders"),
//!             CallOptions::default(),
//!         )
//!         .await?;
//!
//!     println!("started run {}", started.run_id);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Re-export commonly used types
pub use client::{CallOptions, WorkflowServiceClient};
pub use config::ServiceClientConfig;
pub use error::{ClientError, Result};
pub use stub::WorkflowServiceStub;

// Module declarations
pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod stub;

#[cfg(feature = "blocking")]
#[cfg_attr(docsrs, doc(cfg(feature = "blocking")))]
pub mod blocking;

// Re-export the retry engine and wire types
pub use turboflow_core;
pub use turboflow_protocol;

// Re-export key dependencies for convenience
pub use async_trait::async_trait;
pub use serde_json::Value as JsonValue;
pub use tokio_util::sync::CancellationToken;

/// Prelude module for common imports
///
/// # Examples
///
/// ```rust
/// use turboflow::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CallOptions, ClientError, Result, ServiceClientConfig, WorkflowServiceClient,
        WorkflowServiceStub,
    };
    pub use turboflow_core::retry::{Deadline, RetryPolicy, Retryer};
    pub use turboflow_protocol::{Code, Status};
}

/// SDK version, automatically updated from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
