//! Transport seam.
//!
//! [`WorkflowServiceStub`] is the boundary between the client and whatever
//! carries bytes to the orchestration service. A stub performs exactly one
//! attempt per call; retries, timeouts and deadlines are layered on top by
//! [`WorkflowServiceClient`](crate::WorkflowServiceClient).

use std::sync::Arc;

use async_trait::async_trait;
use turboflow_protocol::{
    DescribeNamespaceRequest, DescribeNamespaceResponse, GetWorkflowExecutionHistoryRequest,
    GetWorkflowExecutionHistoryResponse, PollWorkflowTaskQueueRequest,
    PollWorkflowTaskQueueResponse, RespondWorkflowTaskCompletedRequest,
    RespondWorkflowTaskCompletedResponse, SignalWorkflowExecutionRequest,
    SignalWorkflowExecutionResponse, StartWorkflowExecutionRequest, StartWorkflowExecutionResponse,
    Status,
};

/// One method per orchestration service RPC.
///
/// Failures are reported as [`Status`] values so the retry engine can
/// classify them.
#[async_trait]
pub trait WorkflowServiceStub: Send + Sync + 'static {
    /// Describes a namespace.
    async fn describe_namespace(
        &self,
        request: DescribeNamespaceRequest,
    ) -> Result<DescribeNamespaceResponse, Status>;

    /// Starts a workflow execution.
    async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> Result<StartWorkflowExecutionResponse, Status>;

    /// Delivers a signal to a running workflow.
    async fn signal_workflow_execution(
        &self,
        request: SignalWorkflowExecutionRequest,
    ) -> Result<SignalWorkflowExecutionResponse, Status>;

    /// Reads one page of a workflow history, optionally long-polling for new events.
    async fn get_workflow_execution_history(
        &self,
        request: GetWorkflowExecutionHistoryRequest,
    ) -> Result<GetWorkflowExecutionHistoryResponse, Status>;

    /// Long-polls a task queue for the next workflow task.
    async fn poll_workflow_task_queue(
        &self,
        request: PollWorkflowTaskQueueRequest,
    ) -> Result<PollWorkflowTaskQueueResponse, Status>;

    /// Reports the commands produced by a workflow task.
    async fn respond_workflow_task_completed(
        &self,
        request: RespondWorkflowTaskCompletedRequest,
    ) -> Result<RespondWorkflowTaskCompletedResponse, Status>;
}

#[async_trait]
impl<T: WorkflowServiceStub + ?Sized> WorkflowServiceStub for Arc<T> {
    async fn describe_namespace(
        &self,
        request: DescribeNamespaceRequest,
    ) -> Result<DescribeNamespaceResponse, Status> {
        (**self).describe_namespace(request).await
    }

    async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> Result<StartWorkflowExecutionResponse, Status> {
        (**self).start_workflow_execution(request).await
    }

    async fn signal_workflow_execution(
        &self,
        request: SignalWorkflowExecutionRequest,
    ) -> Result<SignalWorkflowExecutionResponse, Status> {
        (**self).signal_workflow_execution(request).await
    }

    async fn get_workflow_execution_history(
        &self,
        request: GetWorkflowExecutionHistoryRequest,
    ) -> Result<GetWorkflowExecutionHistoryResponse, Status> {
        (**self).get_workflow_execution_history(request).await
    }

    async fn poll_workflow_task_queue(
        &self,
        request: PollWorkflowTaskQueueRequest,
    ) -> Result<PollWorkflowTaskQueueResponse, Status> {
        (**self).poll_workflow_task_queue(request).await
    }

    async fn respond_workflow_task_completed(
        &self,
        request: RespondWorkflowTaskCompletedRequest,
    ) -> Result<RespondWorkflowTaskCompletedResponse, Status> {
        (**self).respond_workflow_task_completed(request).await
    }
}
