//! In-process engine
//!
//! Runs registered async handlers on the tokio runtime. Each execution is a
//! spawned task, so it keeps running even if the caller stops waiting, and
//! the execution timeout is enforced around the handler future.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::{EngineError, ExecutionHandle, WorkflowEngine};
use crate::types::{StartExecution, WorkflowIdentifier};

pub type WorkflowFuture = BoxFuture<'static, Result<JsonValue, String>>;

/// An async workflow implementation: JSON input in, JSON result or error out
pub trait WorkflowHandler: Send + Sync + 'static {
    fn run(&self, input: JsonValue) -> WorkflowFuture;
}

impl<F, Fut> WorkflowHandler for F
where
    F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JsonValue, String>> + Send + 'static,
{
    fn run(&self, input: JsonValue) -> WorkflowFuture {
        (self)(input).boxed()
    }
}

/// Workflow handlers keyed by canonical identifier
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    handlers: HashMap<WorkflowIdentifier, Arc<dyn WorkflowHandler>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one under the same name
    pub fn register(
        mut self,
        name: impl Into<WorkflowIdentifier>,
        handler: impl WorkflowHandler,
    ) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &WorkflowIdentifier) -> Option<Arc<dyn WorkflowHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<WorkflowIdentifier> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Engine that executes registered handlers inside the current process.
///
/// Only the IDs of running executions are held. Start requests are kept
/// for inspection only when recording is enabled with [`with_recording`].
///
/// [`with_recording`]: InMemoryEngine::with_recording
pub struct InMemoryEngine {
    registry: WorkflowRegistry,
    recording: bool,
    submissions: RwLock<Vec<StartExecution>>,
    running: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryEngine {
    pub fn new(registry: WorkflowRegistry) -> Self {
        Self {
            registry,
            recording: false,
            submissions: RwLock::new(Vec::new()),
            running: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Keep a copy of every start request, accepted or not
    pub fn with_recording(mut self) -> Self {
        self.recording = true;
        self
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// Recorded start requests, empty unless recording is enabled
    pub async fn submissions(&self) -> Vec<StartExecution> {
        self.submissions.read().await.clone()
    }

    pub async fn submission_count(&self) -> usize {
        self.submissions.read().await.len()
    }

    /// Number of executions that have not finished yet
    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }
}

#[async_trait]
impl WorkflowEngine for InMemoryEngine {
    async fn start_execution(
        &self,
        request: StartExecution,
    ) -> Result<Box<dyn ExecutionHandle>, EngineError> {
        if self.recording {
            self.submissions.write().await.push(request.clone());
        }

        let handler = self
            .registry
            .get(&request.workflow)
            .ok_or_else(|| EngineError::UnknownWorkflow(request.workflow.to_string()))?;

        if !self.running.write().await.insert(request.id.clone()) {
            return Err(EngineError::Rejected(format!(
                "execution '{}' already exists",
                request.id
            )));
        }

        let deadline = request.options.deadline();
        let run = handler.run(request.input);
        let running = Arc::clone(&self.running);
        let id = request.id.clone();
        let task = tokio::spawn(async move {
            let outcome = match deadline {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(outcome) => outcome.map_err(EngineError::Failed),
                    Err(_) => Err(EngineError::TimedOut(limit)),
                },
                None => run.await.map_err(EngineError::Failed),
            };
            running.write().await.remove(&id);
            outcome
        });

        Ok(Box::new(MemoryExecution {
            id: request.id,
            task,
        }))
    }
}

struct MemoryExecution {
    id: String,
    task: JoinHandle<Result<JsonValue, EngineError>>,
}

#[async_trait]
impl ExecutionHandle for MemoryExecution {
    fn execution_id(&self) -> &str {
        &self.id
    }

    async fn await_result(self: Box<Self>) -> Result<JsonValue, EngineError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => Err(EngineError::Failed(format!("workflow task aborted: {}", err))),
        }
    }
}
