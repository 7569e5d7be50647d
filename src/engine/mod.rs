//! Orchestration engine clients
//!
//! The gateway talks to the workflow engine through two small traits:
//! [`WorkflowEngine`] starts an execution and [`ExecutionHandle`] blocks until
//! that execution reaches a terminal state. The engine owns workflow lookup,
//! execution and timeout enforcement; the gateway only supplies a canonical
//! name, an input value and run options.
//!
//! Implementations:
//! - [`PostgresEngine`]: Rhythm-style engine backed by Postgres tables
//! - [`InMemoryEngine`]: in-process engine driven by a handler registry

mod memory;
mod postgres;

pub use memory::{InMemoryEngine, WorkflowFuture, WorkflowHandler, WorkflowRegistry};
pub use postgres::PostgresEngine;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

use crate::types::StartExecution;

/// Errors reported by an orchestration engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be reached
    #[error("engine connection failed: {0}")]
    Connection(String),

    /// No workflow is registered under the requested name
    #[error("workflow '{0}' is not registered")]
    UnknownWorkflow(String),

    /// The engine refused to start the execution
    #[error("execution rejected: {0}")]
    Rejected(String),

    /// The workflow ran and terminated with an error
    #[error("workflow execution failed: {0}")]
    Failed(String),

    /// The workflow exceeded its execution timeout
    #[error("workflow execution timed out after {0:?}")]
    TimedOut(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EngineError {
    /// Classify a database error, separating connectivity problems from the rest
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => EngineError::Connection(err.to_string()),
            other => EngineError::Database(other),
        }
    }
}

/// A client for an orchestration engine.
///
/// Implementations are shared by every in-flight request, so they must not
/// hold locks across the await points of a running execution.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Start a new execution of `request.workflow` under `request.id`
    async fn start_execution(
        &self,
        request: StartExecution,
    ) -> Result<Box<dyn ExecutionHandle>, EngineError>;

    /// Release engine resources at shutdown
    async fn close(&self) {}
}

/// A started execution that can be awaited once
#[async_trait]
pub trait ExecutionHandle: Send {
    fn execution_id(&self) -> &str;

    /// Block until the execution completes, fails or times out
    async fn await_result(self: Box<Self>) -> Result<JsonValue, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_connection_errors() {
        assert!(matches!(
            EngineError::from_sqlx(sqlx::Error::PoolTimedOut),
            EngineError::Connection(_)
        ));
        assert!(matches!(
            EngineError::from_sqlx(sqlx::Error::RowNotFound),
            EngineError::Database(_)
        ));
    }
}
