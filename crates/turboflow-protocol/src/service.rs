//! Request and response payloads of the orchestration service.
//!
//! Only the methods the client runtime exposes are modelled. Workflow inputs,
//! signal arguments and command attributes are opaque JSON values; encoding
//! them is the job of the payload serialization layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// Identifies one run of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Business identifier chosen by the starter.
    pub workflow_id: String,
    /// Identifier of this particular run, assigned by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl WorkflowExecution {
    /// Refers to the latest run of `workflow_id`.
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: None,
        }
    }

    /// Refers to a specific run.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// `DescribeNamespace` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeNamespaceRequest {
    /// Namespace name.
    pub namespace: String,
}

/// `DescribeNamespace` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescribeNamespaceResponse {
    /// Namespace name.
    pub namespace: String,
    /// Namespace state, e.g. `"REGISTERED"`.
    pub state: String,
    /// Retention period of closed workflow histories, in days.
    #[serde(default)]
    pub retention_days: u32,
}

/// `StartWorkflowExecution` request.
///
/// The request id makes the call idempotent, so retrying it after a lost
/// response cannot start a second run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartWorkflowExecutionRequest {
    /// Namespace to start the workflow in.
    pub namespace: String,
    /// Business identifier of the workflow.
    pub workflow_id: String,
    /// Registered workflow type name.
    pub workflow_type: String,
    /// Task queue the first workflow task is dispatched to.
    pub task_queue: String,
    /// Workflow arguments.
    #[serde(default)]
    pub input: Vec<Value>,
    /// Identity of the caller.
    #[serde(default)]
    pub identity: String,
    /// Idempotency token.
    pub request_id: String,
}

impl StartWorkflowExecutionRequest {
    /// Creates a request with a fresh request id and no input.
    pub fn new(
        namespace: impl Into<String>,
        workflow_id: impl Into<String>,
        workflow_type: impl Into<String>,
        task_queue: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            workflow_id: workflow_id.into(),
            workflow_type: workflow_type.into(),
            task_queue: task_queue.into(),
            input: Vec::new(),
            identity: String::new(),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Set the workflow arguments.
    pub fn with_input(mut self, input: Vec<Value>) -> Self {
        self.input = input;
        self
    }

    /// Set the caller identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Checks the fields the service requires.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] for the first empty required field.
    pub fn validate(&self) -> Result<()> {
        require(&self.namespace, "namespace")?;
        require(&self.workflow_id, "workflow_id")?;
        require(&self.workflow_type, "workflow_type")?;
        require(&self.task_queue, "task_queue")?;
        require(&self.request_id, "request_id")
    }
}

/// `StartWorkflowExecution` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartWorkflowExecutionResponse {
    /// Identifier of the started run.
    pub run_id: String,
}

/// `SignalWorkflowExecution` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalWorkflowExecutionRequest {
    /// Namespace of the workflow.
    pub namespace: String,
    /// Workflow to signal.
    pub workflow_execution: WorkflowExecution,
    /// Signal name.
    pub signal_name: String,
    /// Signal arguments.
    #[serde(default)]
    pub input: Vec<Value>,
    /// Identity of the caller.
    #[serde(default)]
    pub identity: String,
    /// Idempotency token.
    pub request_id: String,
}

impl SignalWorkflowExecutionRequest {
    /// Creates a request with a fresh request id and no arguments.
    pub fn new(
        namespace: impl Into<String>,
        workflow_execution: WorkflowExecution,
        signal_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            workflow_execution,
            signal_name: signal_name.into(),
            input: Vec::new(),
            identity: String::new(),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Set the signal arguments.
    pub fn with_input(mut self, input: Vec<Value>) -> Self {
        self.input = input;
        self
    }
}

/// `SignalWorkflowExecution` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalWorkflowExecutionResponse {}

/// One entry of a workflow history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Position in the history, starting at 1.
    pub event_id: i64,
    /// Event type, e.g. `"WorkflowExecutionStarted"`.
    pub event_type: String,
    /// Type-specific attributes.
    #[serde(default)]
    pub attributes: Value,
}

/// `GetWorkflowExecutionHistory` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetWorkflowExecutionHistoryRequest {
    /// Namespace of the workflow.
    pub namespace: String,
    /// Workflow whose history is read.
    pub execution: WorkflowExecution,
    /// Maximum events per page; 0 lets the service choose.
    #[serde(default)]
    pub maximum_page_size: u32,
    /// Token returned by the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    /// Long-poll until a new event is appended.
    #[serde(default)]
    pub wait_new_event: bool,
}

impl GetWorkflowExecutionHistoryRequest {
    /// Requests the first page of `execution`'s history.
    pub fn new(namespace: impl Into<String>, execution: WorkflowExecution) -> Self {
        Self {
            namespace: namespace.into(),
            execution,
            maximum_page_size: 0,
            next_page_token: None,
            wait_new_event: false,
        }
    }

    /// Continue from a previous page.
    pub fn with_next_page_token(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = Some(token.into());
        self
    }

    /// Long-poll for new events.
    pub fn waiting_for_new_event(mut self) -> Self {
        self.wait_new_event = true;
        self
    }
}

/// `GetWorkflowExecutionHistory` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetWorkflowExecutionHistoryResponse {
    /// Events of this page.
    #[serde(default)]
    pub events: Vec<HistoryEvent>,
    /// Token for the next page, absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// `PollWorkflowTaskQueue` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollWorkflowTaskQueueRequest {
    /// Namespace to poll in.
    pub namespace: String,
    /// Task queue to poll.
    pub task_queue: String,
    /// Identity of the polling worker.
    #[serde(default)]
    pub identity: String,
}

/// `PollWorkflowTaskQueue` response.
///
/// An empty task token means the long poll expired without a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollWorkflowTaskQueueResponse {
    /// Opaque token identifying the task; empty when no task was available.
    #[serde(default)]
    pub task_token: String,
    /// Workflow the task belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_execution: Option<WorkflowExecution>,
    /// Workflow type name.
    #[serde(default)]
    pub workflow_type: String,
    /// First page of history for the task.
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
    /// Delivery attempt of this task, starting at 1.
    #[serde(default)]
    pub attempt: u32,
}

impl PollWorkflowTaskQueueResponse {
    /// Returns `true` when the poll returned without a task.
    pub fn is_empty(&self) -> bool {
        self.task_token.is_empty()
    }
}

/// A decision produced by a workflow task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command type, e.g. `"ScheduleActivityTask"`.
    pub command_type: String,
    /// Type-specific attributes.
    #[serde(default)]
    pub attributes: Value,
}

/// `RespondWorkflowTaskCompleted` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondWorkflowTaskCompletedRequest {
    /// Namespace of the task.
    pub namespace: String,
    /// Token of the completed task.
    pub task_token: String,
    /// Commands produced by the task.
    #[serde(default)]
    pub commands: Vec<Command>,
    /// Identity of the worker.
    #[serde(default)]
    pub identity: String,
}

/// `RespondWorkflowTaskCompleted` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondWorkflowTaskCompletedResponse {}

fn require(value: &str, field: &'static str) -> Result<()> {
    if value.is_empty() {
        Err(ProtocolError::MissingField(field))
    } else {
        Ok(())
    }
}
