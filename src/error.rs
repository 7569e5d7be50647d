//! Request-level errors and their HTTP mapping
//!
//! Every variant turns into a fixed, caller-safe body. The detail carried by
//! the variant (parser errors, engine causes) is for server-side logs only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::dispatch::DispatchState;
use crate::engine::EngineError;
use crate::types::{
    ResultEnvelope, UnauthorizedBody, WorkflowIdentifier, INVALID_REQUEST, SERVER_ERROR,
};

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Auth header missing or not equal to the configured token
    #[error("request rejected by auth gate")]
    Unauthorized,

    /// Request body is not valid JSON
    #[error("request body is not valid JSON: {0}")]
    MalformedInput(#[source] serde_json::Error),

    /// Execution timeout header present but not a non-negative integer
    #[error("invalid execution timeout header value {value:?}: expected whole seconds")]
    InvalidTimeout { value: String },

    /// The engine did not accept the execution
    #[error("failed to start workflow {workflow} as execution {id}: {source}")]
    Submission {
        id: String,
        workflow: WorkflowIdentifier,
        #[source]
        source: EngineError,
    },

    /// The execution ran and ended in error or timed out
    #[error("workflow {workflow} execution {id} failed: {source}")]
    Execution {
        id: String,
        workflow: WorkflowIdentifier,
        #[source]
        source: EngineError,
    },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidTimeout { .. }
            | GatewayError::Submission { .. }
            | GatewayError::Execution { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// ID of the execution this error belongs to, once one was minted
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            GatewayError::Submission { id, .. } | GatewayError::Execution { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Last state the request reached before failing
    pub fn failed_after(&self) -> DispatchState {
        match self {
            GatewayError::Unauthorized => DispatchState::Received,
            GatewayError::MalformedInput(_) => DispatchState::Authenticated,
            GatewayError::InvalidTimeout { .. } | GatewayError::Submission { .. } => {
                DispatchState::BodyParsed
            }
            GatewayError::Execution { .. } => DispatchState::AwaitingResult,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            GatewayError::Unauthorized => (status, Json(UnauthorizedBody::default())).into_response(),
            GatewayError::MalformedInput(_) => {
                (status, Json(ResultEnvelope::failed(None, INVALID_REQUEST))).into_response()
            }
            other => {
                let id = other.execution_id().map(str::to_string);
                (status, Json(ResultEnvelope::failed(id, SERVER_ERROR))).into_response()
            }
        }
    }
}
