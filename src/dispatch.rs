//! Workflow request lifecycle
//!
//! ```text
//! Received -> Authenticated -> BodyParsed -> Submitted -> AwaitingResult -> Completed
//!     \              \              \             \               \
//!      +--------------+--------------+-------------+---------------+--> Failed
//! ```
//!
//! Each request makes at most one submission. Retrying is left to the caller,
//! who can re-POST. Awaiting the result holds no lock, so a slow workflow
//! never blocks other requests.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tracing::field::Empty;
use tracing::Span;
use uuid::Uuid;

use crate::auth::AuthGate;
use crate::config::Config;
use crate::engine::WorkflowEngine;
use crate::error::GatewayError;
use crate::naming;
use crate::options::OptionResolver;
use crate::server::AppState;
use crate::types::{ResultEnvelope, StartExecution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Authenticated,
    BodyParsed,
    Submitted,
    AwaitingResult,
    Completed,
    Failed,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchState::Received => "received",
            DispatchState::Authenticated => "authenticated",
            DispatchState::BodyParsed => "body_parsed",
            DispatchState::Submitted => "submitted",
            DispatchState::AwaitingResult => "awaiting_result",
            DispatchState::Completed => "completed",
            DispatchState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One inbound workflow request, borrowed from the HTTP layer
#[derive(Debug, Clone, Copy)]
pub struct WorkflowRequest<'a> {
    pub workflow_type: &'a str,
    pub workflow_name: &'a str,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

/// Runs workflow requests against the shared engine handle
pub struct Dispatcher {
    auth: AuthGate,
    options: OptionResolver,
    engine: Arc<dyn WorkflowEngine>,
}

impl Dispatcher {
    pub fn new(auth: AuthGate, options: OptionResolver, engine: Arc<dyn WorkflowEngine>) -> Self {
        Self {
            auth,
            options,
            engine,
        }
    }

    pub fn from_config(config: &Config, engine: Arc<dyn WorkflowEngine>) -> Result<Self> {
        Ok(Self::new(
            AuthGate::from_config(&config.auth)?,
            OptionResolver::from_config(&config.workflow)?,
            engine,
        ))
    }

    pub fn engine(&self) -> &Arc<dyn WorkflowEngine> {
        &self.engine
    }

    /// Drive one request to a terminal state
    #[tracing::instrument(
        name = "dispatch",
        skip_all,
        fields(
            workflow_type = request.workflow_type,
            workflow_name = request.workflow_name,
            workflow = Empty,
            task_queue = Empty,
            execution_id = Empty,
        )
    )]
    pub async fn dispatch(
        &self,
        request: WorkflowRequest<'_>,
    ) -> Result<ResultEnvelope, GatewayError> {
        let span = Span::current();

        self.auth.check(request.headers)?;
        tracing::trace!(state = %DispatchState::Authenticated);

        let input: JsonValue =
            serde_json::from_slice(request.body).map_err(GatewayError::MalformedInput)?;
        tracing::trace!(state = %DispatchState::BodyParsed);

        let workflow = naming::resolve(request.workflow_type, request.workflow_name);
        span.record("workflow", workflow.as_str());

        let options = self.options.resolve(request.headers)?;
        span.record("task_queue", options.task_queue.as_str());

        let id = Uuid::new_v4().to_string();
        span.record("execution_id", id.as_str());

        tracing::info!(
            timeout_secs = options.execution_timeout.as_secs(),
            "Starting workflow"
        );

        let handle = self
            .engine
            .start_execution(StartExecution {
                id: id.clone(),
                workflow: workflow.clone(),
                input,
                options,
            })
            .await
            .map_err(|source| GatewayError::Submission {
                id: id.clone(),
                workflow: workflow.clone(),
                source,
            })?;
        tracing::debug!(
            state = %DispatchState::AwaitingResult,
            engine_id = handle.execution_id(),
            "Workflow submitted"
        );

        let data = handle
            .await_result()
            .await
            .map_err(|source| GatewayError::Execution {
                id: id.clone(),
                workflow,
                source,
            })?;

        tracing::info!(state = %DispatchState::Completed, "Workflow completed");
        Ok(ResultEnvelope::completed(id, data))
    }
}

/// `POST /:workflow_type/:workflow_name`
pub async fn handle_workflow(
    State(state): State<AppState>,
    Path((workflow_type, workflow_name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = WorkflowRequest {
        workflow_type: &workflow_type,
        workflow_name: &workflow_name,
        headers: &headers,
        body: &body,
    };

    match state.dispatcher.dispatch(request).await {
        Ok(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        Err(err) => {
            log_failure(&err, &workflow_type, &workflow_name);
            err.into_response()
        }
    }
}

fn log_failure(err: &GatewayError, workflow_type: &str, workflow_name: &str) {
    let failed_after = err.failed_after();
    match err {
        // Never log the presented token
        GatewayError::Unauthorized => tracing::warn!(
            state = %DispatchState::Failed,
            %failed_after,
            workflow_type,
            workflow_name,
            "Rejected unauthenticated workflow request"
        ),
        GatewayError::MalformedInput(_) => tracing::warn!(
            state = %DispatchState::Failed,
            %failed_after,
            workflow_type,
            workflow_name,
            error = %err,
            "Rejected workflow request with invalid body"
        ),
        _ => tracing::error!(
            state = %DispatchState::Failed,
            %failed_after,
            workflow_type,
            workflow_name,
            execution_id = err.execution_id(),
            error = %err,
            "Workflow request failed"
        ),
    }
}
