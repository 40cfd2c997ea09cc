//! Workflow service client.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;
use turboflow_core::retry::{Deadline, RetryOptions, Retryer};
use turboflow_protocol::{
    DescribeNamespaceRequest, DescribeNamespaceResponse, GetWorkflowExecutionHistoryRequest,
    GetWorkflowExecutionHistoryResponse, PollWorkflowTaskQueueRequest,
    PollWorkflowTaskQueueResponse, RespondWorkflowTaskCompletedRequest,
    RespondWorkflowTaskCompletedResponse, SignalWorkflowExecutionRequest,
    SignalWorkflowExecutionResponse, StartWorkflowExecutionRequest, StartWorkflowExecutionResponse,
    Status,
};

use crate::config::ServiceClientConfig;
use crate::error::{ClientError, Result};
use crate::observability::{CallMetadata, CallOutcome};
use crate::stub::WorkflowServiceStub;

/// Per-call settings.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use turboflow::CallOptions;
/// use turboflow_core::retry::Deadline;
///
/// let token = CancellationToken::new();
/// let options = CallOptions::default()
///     .with_deadline(Deadline::after(Duration::from_secs(30)))
///     .with_cancellation(token.clone());
///
/// assert!(options.deadline().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    deadline: Option<Deadline>,
    cancellation: Option<CancellationToken>,
}

impl CallOptions {
    /// Bound the whole call, retries included, by `deadline`.
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancel the call when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The call deadline, if any.
    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    /// The cancellation token, if any.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub(crate) fn retry_options(&self, retryer: &Retryer) -> Result<RetryOptions> {
        let options = retryer.options(self.deadline)?;
        Ok(match &self.cancellation {
            Some(token) => options.with_cancellation(token.clone()),
            None => options,
        })
    }
}

/// Client for the orchestration service.
///
/// Every RPC goes through the injected [`Retryer`]: each attempt is bounded
/// by a per-attempt timeout, failures are classified against the policy's
/// do-not-retry table, and the call as a whole honours the caller's deadline
/// and cancellation token.
///
/// # Examples
///
/// ```rust,ignore
/// use turboflow::{CallOptions, ServiceClientConfig, WorkflowServiceClient};
/// use turboflow_protocol::DescribeNamespaceRequest;
///
/// let client = WorkflowServiceClient::new(stub, ServiceClientConfig::from_env()?)?;
/// let namespace = client
///     .describe_namespace(
///         DescribeNamespaceRequest { namespace: "default".into() },
///         CallOptions::default(),
///     )
///     .await?;
/// ```
pub struct WorkflowServiceClient<S> {
    stub: Arc<S>,
    retryer: Retryer,
    config: Arc<ServiceClientConfig>,
}

impl<S> Clone for WorkflowServiceClient<S> {
    fn clone(&self) -> Self {
        Self {
            stub: Arc::clone(&self.stub),
            retryer: self.retryer.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> std::fmt::Debug for WorkflowServiceClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowServiceClient")
            .field("target", &self.config.target)
            .field("namespace", &self.config.namespace)
            .field("retryer", &self.retryer)
            .finish_non_exhaustive()
    }
}

impl<S: WorkflowServiceStub> WorkflowServiceClient<S> {
    /// Creates a client whose retry policy comes from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(stub: S, config: ServiceClientConfig) -> Result<Self> {
        config.validate()?;
        let retryer = Retryer::new(config.retry_policy()?);
        Self::with_retryer(stub, config, retryer)
    }

    /// Creates a client that retries through an existing `retryer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_retryer(
        stub: S,
        config: ServiceClientConfig,
        retryer: Retryer,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            target = %config.target,
            namespace = %config.namespace,
            identity = %config.identity,
            maximum_attempts = retryer.policy().maximum_attempts(),
            expiration = ?retryer.policy().expiration(),
            "Created workflow service client"
        );
        Ok(Self {
            stub: Arc::new(stub),
            retryer,
            config: Arc::new(config),
        })
    }

    /// The client configuration.
    pub fn config(&self) -> &ServiceClientConfig {
        &self.config
    }

    /// The retry engine every call goes through.
    pub fn retryer(&self) -> &Retryer {
        &self.retryer
    }

    /// The underlying stub.
    pub fn stub(&self) -> &Arc<S> {
        &self.stub
    }

    /// Describes a namespace.
    pub async fn describe_namespace(
        &self,
        request: DescribeNamespaceRequest,
        options: CallOptions,
    ) -> Result<DescribeNamespaceResponse> {
        self.call(
            "DescribeNamespace",
            request,
            &options,
            self.config.rpc_timeout,
            |stub, request| async move { stub.describe_namespace(request).await },
        )
        .await
    }

    /// Starts a workflow execution.
    ///
    /// Retries reuse the request id, so a start whose response was lost is
    /// not duplicated by the service.
    pub async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
        options: CallOptions,
    ) -> Result<StartWorkflowExecutionResponse> {
        request.validate()?;
        self.call(
            "StartWorkflowExecution",
            request,
            &options,
            self.config.rpc_timeout,
            |stub, request| async move { stub.start_workflow_execution(request).await },
        )
        .await
    }

    /// Signals a running workflow.
    pub async fn signal_workflow_execution(
        &self,
        request: SignalWorkflowExecutionRequest,
        options: CallOptions,
    ) -> Result<SignalWorkflowExecutionResponse> {
        self.call(
            "SignalWorkflowExecution",
            request,
            &options,
            self.config.rpc_timeout,
            |stub, request| async move { stub.signal_workflow_execution(request).await },
        )
        .await
    }

    /// Reads a page of workflow history.
    ///
    /// Long-polling requests use the long-poll timeout per attempt.
    pub async fn get_workflow_execution_history(
        &self,
        request: GetWorkflowExecutionHistoryRequest,
        options: CallOptions,
    ) -> Result<GetWorkflowExecutionHistoryResponse> {
        let timeout = if request.wait_new_event {
            self.config.long_poll_timeout
        } else {
            self.config.rpc_timeout
        };
        self.call(
            "GetWorkflowExecutionHistory",
            request,
            &options,
            timeout,
            |stub, request| async move { stub.get_workflow_execution_history(request).await },
        )
        .await
    }

    /// Long-polls a task queue for the next workflow task.
    pub async fn poll_workflow_task_queue(
        &self,
        request: PollWorkflowTaskQueueRequest,
        options: CallOptions,
    ) -> Result<PollWorkflowTaskQueueResponse> {
        self.call(
            "PollWorkflowTaskQueue",
            request,
            &options,
            self.config.long_poll_timeout,
            |stub, request| async move { stub.poll_workflow_task_queue(request).await },
        )
        .await
    }

    /// Reports a completed workflow task.
    pub async fn respond_workflow_task_completed(
        &self,
        request: RespondWorkflowTaskCompletedRequest,
        options: CallOptions,
    ) -> Result<RespondWorkflowTaskCompletedResponse> {
        self.call(
            "RespondWorkflowTaskCompleted",
            request,
            &options,
            self.config.rpc_timeout,
            |stub, request| async move { stub.respond_workflow_task_completed(request).await },
        )
        .await
    }

    async fn call<Req, Resp, F, Fut>(
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
        Fut: Future<Output = std::result::Result<Resp, Status>>,
    {
        let retry_options = options.retry_options(&self.retryer)?;
        let metadata = CallMetadata::new(method, self.config.namespace.as_str());
        metadata.log_request();

        let started = Instant::now();
        let deadline = call_deadline(&retry_options, started);
        let future = self.retryer.retry_with_result_async(&retry_options, || {
            timed_attempt(
                method,
                timeout,
                deadline,
                rpc(Arc::clone(&self.stub), request.clone()),
            )
        });
        let progress = future.progress();
        let outcome = future.await;

        let call_outcome = CallOutcome::new(started.elapsed(), progress.attempts());
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

/// The earliest of the caller deadline and the policy expiration.
///
/// No attempt may run past it, however long the per-attempt timeout is.
pub(crate) fn call_deadline(options: &RetryOptions, started: Instant) -> Option<Deadline> {
    options
        .coordinator()
        .effective_deadline(started, options.policy())
}

/// Timeout for one attempt: the configured timeout, cut short by the call deadline.
pub(crate) fn attempt_timeout(configured: Duration, deadline: Option<Deadline>) -> Duration {
    match deadline {
        Some(deadline) => configured.min(deadline.remaining(Instant::now())),
        None => configured,
    }
}

/// Bounds one attempt, reporting a timeout as `DEADLINE_EXCEEDED`.
pub(crate) async fn timed_attempt<Resp>(
    method: &'static str,
    configured: Duration,
    deadline: Option<Deadline>,
    attempt: impl Future<Output = std::result::Result<Resp, Status>>,
) -> std::result::Result<Resp, Status> {
    let timeout = attempt_timeout(configured, deadline);
    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(Status::deadline_exceeded(format!(
            "{method} attempt timed out after {timeout:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use rstest::rstest;
    use turboflow_core::retry::RetryPolicyConfig;
    use turboflow_protocol::{Code, WorkflowExecution};

    use super::*;

    /// Stub that replays scripted namespace responses and records poll timeouts.
    #[derive(Default)]
    struct ScriptedStub {
        describe: Mutex<Vec<std::result::Result<DescribeNamespaceResponse, Status>>>,
        describe_calls: AtomicU32,
        start_request_ids: Mutex<Vec<String>>,
        poll_delay: Option<Duration>,
    }

    impl ScriptedStub {
        fn with_describe(
            script: Vec<std::result::Result<DescribeNamespaceResponse, Status>>,
        ) -> Self {
            Self {
                describe: Mutex::new(script.into_iter().rev().collect()),
                ..Default::default()
            }
        }
    }

    fn namespace(name: &str) -> DescribeNamespaceResponse {
        DescribeNamespaceResponse {
            namespace: name.to_string(),
            state: "REGISTERED".to_string(),
            retention_days: 3,
        }
    }

    #[async_trait]
    impl WorkflowServiceStub for ScriptedStub {
        async fn describe_namespace(
            &self,
            _request: DescribeNamespaceRequest,
        ) -> std::result::Result<DescribeNamespaceResponse, Status> {
            self.describe_calls.fetch_add(1, Ordering::SeqCst);
            self.describe
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(Status::internal("script exhausted")))
        }

        async fn start_workflow_execution(
            &self,
            request: StartWorkflowExecutionRequest,
        ) -> std::result::Result<StartWorkflowExecutionResponse, Status> {
            let mut ids = self.start_request_ids.lock().unwrap();
            ids.push(request.request_id);
            if ids.len() < 2 {
                Err(Status::unavailable("connection reset"))
            } else {
                Ok(StartWorkflowExecutionResponse {
                    run_id: "run-1".to_string(),
                })
            }
        }

        async fn signal_workflow_execution(
            &self,
            request: SignalWorkflowExecutionRequest,
        ) -> std::result::Result<SignalWorkflowExecutionResponse, Status> {
            Err(Status::not_found(format!(
                "workflow {} not found",
                request.workflow_execution.workflow_id
            )))
        }

        async fn get_workflow_execution_history(
            &self,
            _request: GetWorkflowExecutionHistoryRequest,
        ) -> std::result::Result<GetWorkflowExecutionHistoryResponse, Status> {
            Ok(GetWorkflowExecutionHistoryResponse::default())
        }

        async fn poll_workflow_task_queue(
            &self,
            _request: PollWorkflowTaskQueueRequest,
        ) -> std::result::Result<PollWorkflowTaskQueueResponse, Status> {
            if let Some(delay) = self.poll_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(PollWorkflowTaskQueueResponse::default())
        }

        async fn respond_workflow_task_completed(
            &self,
            _request: RespondWorkflowTaskCompletedRequest,
        ) -> std::result::Result<RespondWorkflowTaskCompletedResponse, Status> {
            Ok(RespondWorkflowTaskCompletedResponse::default())
        }
    }

    fn config() -> ServiceClientConfig {
        ServiceClientConfig::default()
            .with_rpc_timeout(Duration::from_secs(1))
            .with_long_poll_timeout(Duration::from_secs(60))
            .with_rpc_retry(RetryPolicyConfig {
                initial_interval_ms: 100,
                maximum_attempts: 5,
                jitter: 0.0,
                ..Default::default()
            })
    }

    fn describe_request() -> DescribeNamespaceRequest {
        DescribeNamespaceRequest {
            namespace: "default".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let stub = ScriptedStub::with_describe(vec![
            Err(Status::unavailable("down")),
            Err(Status::new(Code::ResourceExhausted, "busy")),
            Ok(namespace("default")),
        ]);
        let client = WorkflowServiceClient::new(stub, config()).unwrap();

        let response = client
            .describe_namespace(describe_request(), CallOptions::default())
            .await
            .unwrap();

        assert_eq!(response.namespace, "default");
        assert_eq!(client.stub().describe_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_surfaces_unchanged() {
        let client = WorkflowServiceClient::new(ScriptedStub::default(), config()).unwrap();
        let request = SignalWorkflowExecutionRequest::new(
            "default",
            WorkflowExecution::new("order-9"),
            "cancel",
        );

        let err = client
            .signal_workflow_execution(request, CallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 1);
        let status = err.status().unwrap();
        assert_eq!(status.status_code(), Code::NotFound);
        assert_eq!(status.message(), "workflow order-9 not found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_retries_reuse_request_id() {
        let client = WorkflowServiceClient::new(ScriptedStub::default(), config()).unwrap();
        let request =
            StartWorkflowExecutionRequest::new("default", "order-1", "OrderWorkflow", "orders");
        let request_id = request.request_id.clone();

        let response = client
            .start_workflow_execution(request, CallOptions::default())
            .await
            .unwrap();

        assert_eq!(response.run_id, "run-1");
        let ids = client.stub().start_request_ids.lock().unwrap();
        assert_eq!(*ids, vec![request_id.clone(), request_id]);
    }

    #[tokio::test]
    async fn test_invalid_start_request_rejected_before_sending() {
        let client = WorkflowServiceClient::new(ScriptedStub::default(), config()).unwrap();
        let request = StartWorkflowExecutionRequest::new("default", "order-1", "", "orders");

        let err = client
            .start_workflow_execution(request, CallOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::InvalidRequest(_)));
        assert!(client.stub().start_request_ids.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_becomes_retryable_deadline_status() {
        let stub = ScriptedStub {
            poll_delay: Some(Duration::from_secs(120)),
            ..Default::default()
        };
        let config = config().with_rpc_retry(RetryPolicyConfig {
            initial_interval_ms: 100,
            maximum_attempts: 2,
            expiration_ms: None,
            jitter: 0.0,
            ..Default::default()
        });
        let client = WorkflowServiceClient::new(stub, config).unwrap();
        let started = Instant::now();

        let err = client
            .poll_workflow_task_queue(
                PollWorkflowTaskQueueRequest {
                    namespace: "default".into(),
                    task_queue: "orders".into(),
                    identity: "worker".into(),
                },
                CallOptions::default(),
            )
            .await
            .unwrap_err();

        // Two long-poll attempts of 60s each, 100ms apart.
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.status().unwrap().status_code(), Code::DeadlineExceeded);
        assert!(started.elapsed() >= Duration::from_millis(120_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_deadline_cuts_attempt_timeout() {
        let stub = ScriptedStub {
            poll_delay: Some(Duration::from_secs(120)),
            ..Default::default()
        };
        let client = WorkflowServiceClient::new(stub, config()).unwrap();
        let started = Instant::now();

        let err = client
            .poll_workflow_task_queue(
                PollWorkflowTaskQueueRequest {
                    namespace: "default".into(),
                    task_queue: "orders".into(),
                    identity: "worker".into(),
                },
                CallOptions::default().with_deadline(Deadline::after(Duration::from_secs(5))),
            )
            .await
            .unwrap_err();

        assert!(err.is_deadline_exceeded());
        assert_eq!(err.attempts(), 1);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_expiration_cuts_hung_attempt() {
        let stub = ScriptedStub {
            poll_delay: Some(Duration::from_secs(3600)),
            ..Default::default()
        };
        let config = config().with_rpc_retry(RetryPolicyConfig {
            maximum_attempts: 0,
            expiration_ms: Some(2_000),
            jitter: 0.0,
            ..Default::default()
        });
        let client = WorkflowServiceClient::new(stub, config).unwrap();
        let started = Instant::now();

        let err = client
            .poll_workflow_task_queue(
                PollWorkflowTaskQueueRequest {
                    namespace: "default".into(),
                    task_queue: "orders".into(),
                    identity: "worker".into(),
                },
                CallOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(err.is_deadline_exceeded());
        assert_eq!(err.attempts(), 1);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_token_cancels_call() {
        let stub = ScriptedStub {
            poll_delay: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let client = WorkflowServiceClient::new(stub, config()).unwrap();
        let token = CancellationToken::new();

        tokio::spawn({
            let token = token.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                token.cancel();
            }
        });

        let err = client
            .poll_workflow_task_queue(
                PollWorkflowTaskQueueRequest {
                    namespace: "default".into(),
                    task_queue: "orders".into(),
                    identity: String::new(),
                },
                CallOptions::default().with_cancellation(token),
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[test]
    fn test_attempt_timeout_respects_deadline() {
        let configured = Duration::from_secs(10);

        assert_eq!(attempt_timeout(configured, None), configured);
        assert!(
            attempt_timeout(configured, Some(Deadline::after(Duration::from_secs(2))))
                <= Duration::from_secs(2)
        );
        assert_eq!(
            attempt_timeout(configured, Some(Deadline::at(Instant::now()))),
            Duration::ZERO
        );
    }

    #[rstest]
    #[case::expiration_only(None, Some(2_000), Duration::from_secs(2))]
    #[case::caller_deadline_earlier(Some(1), Some(2_000), Duration::from_secs(1))]
    #[case::expiration_earlier(Some(5), Some(2_000), Duration::from_secs(2))]
    #[case::caller_deadline_only(Some(5), None, Duration::from_secs(5))]
    fn test_call_deadline_merges_caller_deadline_and_expiration(
        #[case] caller_secs: Option<u64>,
        #[case] expiration_ms: Option<u64>,
        #[case] expected: Duration,
    ) {
        let config = config().with_rpc_retry(RetryPolicyConfig {
            maximum_attempts: 0,
            expiration_ms,
            ..Default::default()
        });
        let client = WorkflowServiceClient::new(ScriptedStub::default(), config).unwrap();
        let started = Instant::now();
        let caller_deadline =
            caller_secs.map(|secs| Deadline::after_from(started, Duration::from_secs(secs)));
        let options = CallOptions {
            deadline: caller_deadline,
            ..Default::default()
        }
        .retry_options(client.retryer())
        .unwrap();

        let deadline = call_deadline(&options, started).unwrap();

        assert_eq!(deadline.instant(), started + expected);
    }

    #[test]
    fn test_unbounded_retry_policy_requires_call_deadline() {
        let config = config().with_rpc_retry(RetryPolicyConfig {
            maximum_attempts: 0,
            expiration_ms: None,
            ..Default::default()
        });
        let client = WorkflowServiceClient::new(ScriptedStub::default(), config).unwrap();

        assert!(matches!(
            CallOptions::default().retry_options(client.retryer()),
            Err(ClientError::RetryPolicy(_))
        ));
        assert!(CallOptions::default()
            .with_deadline(Deadline::after(Duration::from_secs(1)))
            .retry_options(client.retryer())
            .is_ok());
    }
}
