//! Postgres-backed engine client
//!
//! Submits executions to a Rhythm-style engine that keeps its state in
//! Postgres. The gateway only touches three tables:
//!
//! - `workflow_definitions (name, ...)`: registry consulted to reject
//!   unknown workflow names before anything is enqueued
//! - `executions (id, type, function_name, queue, status, inputs, output,
//!   timeout_seconds, created_at, completed_at)`
//! - `work_queue (execution_id, queue, priority)`
//!
//! Workers claim the queued execution and write `status`/`output` back. The
//! handle polls the row until it is terminal. Once the execution timeout has
//! elapsed the handle fails the execution in the engine so no worker picks
//! it up afterwards.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

use super::{EngineError, ExecutionHandle, WorkflowEngine};
use crate::config::EngineConfig;
use crate::types::{ExecutionStatus, StartExecution};

/// Client for a Postgres-backed workflow engine.
///
/// Holds one connection pool for the life of the process. Connections are
/// checked out per query and returned when the query future finishes, on
/// success and error alike.
#[derive(Clone)]
pub struct PostgresEngine {
    pool: PgPool,
    poll_interval: Duration,
}

impl PostgresEngine {
    /// Create the shared pool described by `config` and verify connectivity
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.url)
            .context("Invalid engine database URL")?
            .options([("search_path", config.namespace.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .context("Failed to connect to engine database")?;

        Ok(Self::new(
            pool,
            Duration::from_millis(config.poll_interval_ms),
        ))
    }

    pub fn new(pool: PgPool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn workflow_registered(&self, name: &str) -> Result<bool, EngineError> {
        let found: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM workflow_definitions
            WHERE name = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(EngineError::from_sqlx)?;

        Ok(found.is_some())
    }
}

#[async_trait]
impl WorkflowEngine for PostgresEngine {
    async fn start_execution(
        &self,
        request: StartExecution,
    ) -> Result<Box<dyn ExecutionHandle>, EngineError> {
        let name = request.workflow.as_str();
        if !self.workflow_registered(name).await? {
            return Err(EngineError::UnknownWorkflow(name.to_string()));
        }

        let timeout_seconds = request
            .options
            .deadline()
            .map(|limit| i64::try_from(limit.as_secs()).unwrap_or(i64::MAX));

        let mut tx = self.pool.begin().await.map_err(EngineError::from_sqlx)?;

        let inserted: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO executions (
                id, type, function_name, queue, status,
                inputs, timeout_seconds
            ) VALUES ($1, 'workflow', $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&request.id)
        .bind(name)
        .bind(&request.options.task_queue)
        .bind(ExecutionStatus::Pending)
        .bind(&request.input)
        .bind(timeout_seconds)
        .fetch_optional(&mut *tx)
        .await
        .map_err(EngineError::from_sqlx)?;

        if inserted.is_none() {
            return Err(EngineError::Rejected(format!(
                "execution '{}' already exists",
                request.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO work_queue (execution_id, queue, priority)
            VALUES ($1, $2, 0)
            "#,
        )
        .bind(&request.id)
        .bind(&request.options.task_queue)
        .execute(&mut *tx)
        .await
        .map_err(EngineError::from_sqlx)?;

        tx.commit().await.map_err(EngineError::from_sqlx)?;

        Ok(Box::new(PostgresExecution {
            id: request.id,
            pool: self.pool.clone(),
            poll_interval: self.poll_interval,
            deadline: request.options.deadline(),
            started: Instant::now(),
        }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

struct PostgresExecution {
    id: String,
    pool: PgPool,
    poll_interval: Duration,
    deadline: Option<Duration>,
    started: Instant,
}

impl PostgresExecution {
    async fn poll(&self) -> Result<Option<(ExecutionStatus, Option<JsonValue>)>, EngineError> {
        sqlx::query_as("SELECT status, output FROM executions WHERE id = $1")
            .bind(&self.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(EngineError::from_sqlx)
    }

    /// Fail a still-running execution. Returns false if it finished first.
    async fn expire(&self) -> Result<bool, EngineError> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = 'failed',
                output = '{"error": "Workflow execution timed out"}',
                completed_at = NOW()
            WHERE id = $1
              AND status IN ('pending', 'running', 'suspended')
            "#,
        )
        .bind(&self.id)
        .execute(&self.pool)
        .await
        .map_err(EngineError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ExecutionHandle for PostgresExecution {
    fn execution_id(&self) -> &str {
        &self.id
    }

    async fn await_result(self: Box<Self>) -> Result<JsonValue, EngineError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.poll().await? {
                None => {
                    return Err(EngineError::Rejected(format!(
                        "execution '{}' no longer exists",
                        self.id
                    )))
                }
                Some((ExecutionStatus::Completed, output)) => {
                    return Ok(output.unwrap_or(JsonValue::Null))
                }
                Some((ExecutionStatus::Failed, output)) => {
                    let cause = output
                        .map(|value| value.to_string())
                        .unwrap_or_else(|| "no error recorded".to_string());
                    return Err(EngineError::Failed(cause));
                }
                Some(_) => {}
            }

            if let Some(limit) = self.deadline {
                if self.started.elapsed() >= limit && self.expire().await? {
                    return Err(EngineError::TimedOut(limit));
                }
            }
        }
    }
}
