//! Integration tests and utilities for TurboFlow workspace
//!
//! [`FlakyService`] is an in-memory orchestration service that can be told to
//! fail the next calls of any method, or to answer slowly. The end-to-end
//! tests drive the real client and retry engine against it.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use turboflow::WorkflowServiceStub;
use turboflow_protocol::{
    Code, DescribeNamespaceRequest, DescribeNamespaceResponse, GetWorkflowExecutionHistoryRequest,
    GetWorkflowExecutionHistoryResponse, HistoryEvent, PollWorkflowTaskQueueRequest,
    PollWorkflowTaskQueueResponse, RespondWorkflowTaskCompletedRequest,
    RespondWorkflowTaskCompletedResponse, SignalWorkflowExecutionRequest,
    SignalWorkflowExecutionResponse, StartWorkflowExecutionRequest, StartWorkflowExecutionResponse,
    Status, WorkflowExecution,
};
use uuid::Uuid;

/// Service method names, as used for scripting failures and counting calls.
pub mod method {
    /// `DescribeNamespace`
    pub const DESCRIBE_NAMESPACE: &str = "DescribeNamespace";
    /// `StartWorkflowExecution`
    pub const START_WORKFLOW_EXECUTION: &str = "StartWorkflowExecution";
    /// `SignalWorkflowExecution`
    pub const SIGNAL_WORKFLOW_EXECUTION: &str = "SignalWorkflowExecution";
    /// `GetWorkflowExecutionHistory`
    pub const GET_WORKFLOW_EXECUTION_HISTORY: &str = "GetWorkflowExecutionHistory";
    /// `PollWorkflowTaskQueue`
    pub const POLL_WORKFLOW_TASK_QUEUE: &str = "PollWorkflowTaskQueue";
    /// `RespondWorkflowTaskCompleted`
    pub const RESPOND_WORKFLOW_TASK_COMPLETED: &str = "RespondWorkflowTaskCompleted";
}

#[derive(Debug)]
struct Workflow {
    run_id: String,
    request_id: String,
    workflow_type: String,
    task_queue: String,
    history: Vec<HistoryEvent>,
}

impl Workflow {
    fn append(&mut self, event_type: &str, attributes: serde_json::Value) {
        let event_id = self.history.len() as i64 + 1;
        self.history.push(HistoryEvent {
            event_id,
            event_type: event_type.to_string(),
            attributes,
        });
    }
}

#[derive(Debug, Default)]
struct State {
    namespaces: Vec<String>,
    workflows: HashMap<String, Workflow>,
    pending_tasks: VecDeque<(String, String)>,
    failures: HashMap<&'static str, VecDeque<Status>>,
    latency: HashMap<&'static str, Duration>,
    calls: HashMap<&'static str, u32>,
}

/// In-memory orchestration service with scriptable failures.
#[derive(Debug)]
pub struct FlakyService {
    state: Mutex<State>,
}

impl Default for FlakyService {
    fn default() -> Self {
        Self::new()
    }
}

impl FlakyService {
    /// A service with the `default` namespace registered.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                namespaces: vec!["default".to_string()],
                ..State::default()
            }),
        }
    }

    /// Fail the next calls of `method` with `statuses`, in order.
    pub fn fail_next(&self, method: &'static str, statuses: impl IntoIterator<Item = Status>) {
        self.lock()
            .failures
            .entry(method)
            .or_default()
            .extend(statuses);
    }

    /// Fail the next `times` calls of `method` with `code`.
    pub fn fail_times(&self, method: &'static str, code: Code, times: usize) {
        self.fail_next(
            method,
            (0..times).map(|i| Status::new(code, format!("injected failure {}", i + 1))),
        );
    }

    /// Delay every answer of `method` by `latency`.
    pub fn set_latency(&self, method: &'static str, latency: Duration) {
        self.lock().latency.insert(method, latency);
    }

    /// Number of calls `method` has received, failed ones included.
    pub fn calls(&self, method: &str) -> u32 {
        self.lock().calls.get(method).copied().unwrap_or(0)
    }

    /// Number of events in `workflow_id`'s history.
    pub fn history_len(&self, workflow_id: &str) -> usize {
        self.lock()
            .workflows
            .get(workflow_id)
            .map_or(0, |workflow| workflow.history.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Counts the call, waits out any configured latency and pops an injected failure.
    async fn enter(&self, method: &'static str) -> Result<(), Status> {
        let latency = {
            let mut state = self.lock();
            *state.calls.entry(method).or_default() += 1;
            state.latency.get(method).copied()
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.lock().failures.get_mut(method).and_then(VecDeque::pop_front) {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WorkflowServiceStub for FlakyService {
    async fn describe_namespace(
        &self,
        request: DescribeNamespaceRequest,
    ) -> Result<DescribeNamespaceResponse, Status> {
        self.enter(method::DESCRIBE_NAMESPACE).await?;
        let state = self.lock();
        if !state.namespaces.contains(&request.namespace) {
            return Err(Status::not_found(format!(
                "namespace {} not found",
                request.namespace
            )));
        }
        Ok(DescribeNamespaceResponse {
            namespace: request.namespace,
            state: "REGISTERED".to_string(),
            retention_days: 3,
        })
    }

    async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> Result<StartWorkflowExecutionResponse, Status> {
        self.enter(method::START_WORKFLOW_EXECUTION).await?;
        let mut state = self.lock();
        if let Some(existing) = state.workflows.get(&request.workflow_id) {
            return if existing.request_id == request.request_id {
                Ok(StartWorkflowExecutionResponse {
                    run_id: existing.run_id.clone(),
                })
            } else {
                Err(Status::new(
                    Code::AlreadyExists,
                    format!("workflow {} already started", request.workflow_id),
                ))
            };
        }

        let run_id = Uuid::new_v4().to_string();
        let mut workflow = Workflow {
            run_id: run_id.clone(),
            request_id: request.request_id,
            workflow_type: request.workflow_type,
            task_queue: request.task_queue,
            history: Vec::new(),
        };
        workflow.append(
            "WorkflowExecutionStarted",
            json!({ "input": request.input, "identity": request.identity }),
        );
        state
            .pending_tasks
            .push_back((workflow.task_queue.clone(), request.workflow_id.clone()));
        state.workflows.insert(request.workflow_id, workflow);
        Ok(StartWorkflowExecutionResponse { run_id })
    }

    async fn signal_workflow_execution(
        &self,
        request: SignalWorkflowExecutionRequest,
    ) -> Result<SignalWorkflowExecutionResponse, Status> {
        self.enter(method::SIGNAL_WORKFLOW_EXECUTION).await?;
        let workflow_id = request.workflow_execution.workflow_id;
        let mut state = self.lock();
        let workflow = state.workflows.get_mut(&workflow_id).ok_or_else(|| {
            Status::not_found(format!("workflow {workflow_id} not found"))
        })?;
        workflow.append(
            "WorkflowExecutionSignaled",
            json!({ "signal_name": request.signal_name, "input": request.input }),
        );
        Ok(SignalWorkflowExecutionResponse {})
    }

    async fn get_workflow_execution_history(
        &self,
        request: GetWorkflowExecutionHistoryRequest,
    ) -> Result<GetWorkflowExecutionHistoryResponse, Status> {
        self.enter(method::GET_WORKFLOW_EXECUTION_HISTORY).await?;
        let workflow_id = request.execution.workflow_id;
        let state = self.lock();
        let workflow = state.workflows.get(&workflow_id).ok_or_else(|| {
            Status::not_found(format!("workflow {workflow_id} not found"))
        })?;

        let start = request
            .next_page_token
            .as_deref()
            .and_then(|token| token.parse::<usize>().ok())
            .unwrap_or(0);
        let page_size = match request.maximum_page_size {
            0 => workflow.history.len(),
            size => size as usize,
        };
        let end = (start + page_size).min(workflow.history.len());
        let events = workflow.history.get(start..end).unwrap_or_default().to_vec();
        let next_page_token = (end < workflow.history.len()).then(|| end.to_string());

        Ok(GetWorkflowExecutionHistoryResponse {
            events,
            next_page_token,
        })
    }

    async fn poll_workflow_task_queue(
        &self,
        request: PollWorkflowTaskQueueRequest,
    ) -> Result<PollWorkflowTaskQueueResponse, Status> {
        self.enter(method::POLL_WORKFLOW_TASK_QUEUE).await?;
        let mut state = self.lock();
        let position = state
            .pending_tasks
            .iter()
            .position(|(queue, _)| *queue == request.task_queue);
        let Some((_, workflow_id)) = position.and_then(|i| state.pending_tasks.remove(i)) else {
            return Ok(PollWorkflowTaskQueueResponse::default());
        };
        let Some(workflow) = state.workflows.get(&workflow_id) else {
            return Ok(PollWorkflowTaskQueueResponse::default());
        };

        Ok(PollWorkflowTaskQueueResponse {
            task_token: format!("{workflow_id}/{}", workflow.history.len()),
            workflow_execution: Some(
                WorkflowExecution::new(workflow_id.clone()).with_run_id(workflow.run_id.clone()),
            ),
            workflow_type: workflow.workflow_type.clone(),
            history: workflow.history.clone(),
            attempt: 1,
        })
    }

    async fn respond_workflow_task_completed(
        &self,
        request: RespondWorkflowTaskCompletedRequest,
    ) -> Result<RespondWorkflowTaskCompletedResponse, Status> {
        self.enter(method::RESPOND_WORKFLOW_TASK_COMPLETED).await?;
        let workflow_id = request
            .task_token
            .split_once('/')
            .map(|(workflow_id, _)| workflow_id.to_string())
            .ok_or_else(|| Status::new(Code::InvalidArgument, "malformed task token"))?;
        let mut state = self.lock();
        let workflow = state.workflows.get_mut(&workflow_id).ok_or_else(|| {
            Status::not_found(format!("workflow {workflow_id} not found"))
        })?;
        workflow.append(
            "WorkflowTaskCompleted",
            json!({ "commands": request.commands.len(), "identity": request.identity }),
        );
        Ok(RespondWorkflowTaskCompletedResponse {})
    }
}
