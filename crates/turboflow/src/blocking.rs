//! Blocking workflow service client.
//!
//! Wraps [`WorkflowServiceClient`] for callers without an async runtime.
//! Each attempt runs on a private current-thread runtime; backoff waits
//! block the calling thread through the retry engine's blocking executor.
//!
//! Must not be used from inside an async runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::time::Instant;
use turboflow_core::retry::Retryer;
use turboflow_protocol::{
    DescribeNamespaceRequest, DescribeNamespaceResponse, GetWorkflowExecutionHistoryRequest,
    GetWorkflowExecutionHistoryResponse, PollWorkflowTaskQueueRequest,
    PollWorkflowTaskQueueResponse, RespondWorkflowTaskCompletedRequest,
    RespondWorkflowTaskCompletedResponse, SignalWorkflowExecutionRequest,
    SignalWorkflowExecutionResponse, StartWorkflowExecutionRequest, StartWorkflowExecutionResponse,
    Status,
};

use crate::client::{CallOptions, WorkflowServiceClient, call_deadline, timed_attempt};
use crate::config::ServiceClientConfig;
use crate::error::{ClientError, Result};
use crate::observability::{CallMetadata, CallOutcome};
use crate::stub::WorkflowServiceStub;

/// Blocking counterpart of [`WorkflowServiceClient`].
///
/// # Examples
///
/// ```rust,ignore
/// use turboflow::blocking::BlockingWorkflowServiceClient;
/// use turboflow::{CallOptions, ServiceClientConfig};
/// use turboflow_protocol::SignalWorkflowExecutionRequest;
///
/// let client = BlockingWorkflowServiceClient::new(stub, ServiceClientConfig::default())?;
/// client.signal_workflow_execution(request, CallOptions::default())?;
/// ```
#[derive(Debug)]
pub struct BlockingWorkflowServiceClient<S> {
    inner: WorkflowServiceClient<S>,
    runtime: Runtime,
}

impl<S: WorkflowServiceStub> BlockingWorkflowServiceClient<S> {
    /// Creates a blocking client whose retry policy comes from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the runtime
    /// cannot be started.
    pub fn new(stub: S, config: ServiceClientConfig) -> Result<Self> {
        Self::from_async(WorkflowServiceClient::new(stub, config)?)
    }

    /// Creates a blocking client that retries through an existing `retryer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the runtime
    /// cannot be started.
    pub fn with_retryer(stub: S, config: ServiceClientConfig, retryer: Retryer) -> Result<Self> {
        Self::from_async(WorkflowServiceClient::with_retryer(stub, config, retryer)?)
    }

    /// Wraps an existing async client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the runtime cannot be started.
    pub fn from_async(inner: WorkflowServiceClient<S>) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    /// The wrapped async client.
    pub fn inner(&self) -> &WorkflowServiceClient<S> {
        &self.inner
    }

    /// Describes a namespace.
    pub fn describe_namespace(
        &self,
        request: DescribeNamespaceRequest,
        options: CallOptions,
    ) -> Result<DescribeNamespaceResponse> {
        self.call(
            "DescribeNamespace",
            request,
            &options,
            self.inner.config().rpc_timeout,
            |stub, request| async move { stub.describe_namespace(request).await },
        )
    }

    /// Starts a workflow execution.
    pub fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
        options: CallOptions,
    ) -> Result<StartWorkflowExecutionResponse> {
        request.validate()?;
        self.call(
            "StartWorkflowExecution",
            request,
            &options,
            self.inner.config().rpc_timeout,
            |stub, request| async move { stub.start_workflow_execution(request).await },
        )
    }

    /// Signals a running workflow.
    pub fn signal_workflow_execution(
        &self,
        request: SignalWorkflowExecutionRequest,
        options: CallOptions,
    ) -> Result<SignalWorkflowExecutionResponse> {
        self.call(
            "SignalWorkflowExecution",
            request,
            &options,
            self.inner.config().rpc_timeout,
            |stub, request| async move { stub.signal_workflow_execution(request).await },
        )
    }

    /// Reads a page of workflow history.
    pub fn get_workflow_execution_history(
        &self,
        request: GetWorkflowExecutionHistoryRequest,
        options: CallOptions,
    ) -> Result<GetWorkflowExecutionHistoryResponse> {
        let timeout = if request.wait_new_event {
            self.inner.config().long_poll_timeout
        } else {
            self.inner.config().rpc_timeout
        };
        self.call(
            "GetWorkflowExecutionHistory",
            request,
            &options,
            timeout,
            |stub, request| async move { stub.get_workflow_execution_history(request).await },
        )
    }

    /// Long-polls a task queue for the next workflow task.
    pub fn poll_workflow_task_queue(
        &self,
        request: PollWorkflowTaskQueueRequest,
        options: CallOptions,
    ) -> Result<PollWorkflowTaskQueueResponse> {
        self.call(
            "PollWorkflowTaskQueue",
            request,
            &options,
            self.inner.config().long_poll_timeout,
            |stub, request| async move { stub.poll_workflow_task_queue(request).await },
        )
    }

    /// Reports a completed workflow task.
    pub fn respond_workflow_task_completed(
        &self,
        request: RespondWorkflowTaskCompletedRequest,
        options: CallOptions,
    ) -> Result<RespondWorkflowTaskCompletedResponse> {
        self.call(
            "RespondWorkflowTaskCompleted",
            request,
            &options,
            self.inner.config().rpc_timeout,
            |stub, request| async move { stub.respond_workflow_task_completed(request).await },
        )
    }

    fn call<Req, Resp, F, Fut>(
        &self,
        method: &'static str,
        request: Req,
        options: &CallOptions,
        timeout: Duration,
        rpc: F,
    ) -> Result<Resp>
    where
        Req: Clone,
        F: Fn(Arc<S>, Req) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<Resp, Status>>,
    {
        let retryer = self.inner.retryer();
        let retry_options = options.retry_options(retryer)?;
        let metadata = CallMetadata::new(method, self.inner.config().namespace.as_str());
        metadata.log_request();

        let started = Instant::now();
        let deadline = call_deadline(&retry_options, started);
        let mut attempts = 0;
        let outcome = retryer.retry_with_result(&retry_options, || {
            attempts += 1;
            let attempt = rpc(Arc::clone(self.inner.stub()), request.clone());
            self.runtime
                .block_on(timed_attempt(method, timeout, deadline, attempt))
        });

        let call_outcome = CallOutcome::new(started.elapsed(), attempts);
        match outcome {
            Ok(response) => {
                call_outcome.log_success(&metadata);
                Ok(response)
            }
            Err(source) => {
                let error = ClientError::Rpc { method, source };
                call_outcome.log_error(&metadata, &error);
                Err(error)
            }
        }
    }
}
