use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::time::Duration;

/// Execution timeout applied when the caller does not send one
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(10);

pub const INVALID_REQUEST: &str = "Invalid Request";
pub const UNAUTHORIZED: &str = "Unauthorized";
pub const SERVER_ERROR: &str = "Internal Server Error";

/// Canonical workflow name built from the two URL path segments.
///
/// Engines key their workflow registries by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowIdentifier(String);

impl WorkflowIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowIdentifier {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for WorkflowIdentifier {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Per-request run parameters handed to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    pub task_queue: String,
    /// Zero means the engine applies no execution timeout
    #[serde(with = "duration_secs")]
    pub execution_timeout: Duration,
}

impl ExecutionOptions {
    pub fn new(task_queue: impl Into<String>, execution_timeout: Duration) -> Self {
        Self {
            task_queue: task_queue.into(),
            execution_timeout,
        }
    }

    /// The timeout the engine should enforce, if any
    pub fn deadline(&self) -> Option<Duration> {
        if self.execution_timeout.is_zero() {
            None
        } else {
            Some(self.execution_timeout)
        }
    }
}

/// Everything an engine needs to start one workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartExecution {
    /// Desired execution ID, minted by the gateway
    pub id: String,
    pub workflow: WorkflowIdentifier,
    pub input: JsonValue,
    pub options: ExecutionOptions,
}

/// Response body for every workflow request.
///
/// `data` and `errors` are mutually exclusive. `data` is kept even when the
/// workflow returned `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,
}

impl ResultEnvelope {
    pub fn completed(id: impl Into<String>, data: JsonValue) -> Self {
        Self {
            id: Some(id.into()),
            data: Some(data),
            errors: None,
        }
    }

    pub fn failed(id: Option<String>, message: &str) -> Self {
        Self {
            id,
            data: None,
            errors: Some(message.to_string()),
        }
    }
}

/// Body of a rejected (401) request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnauthorizedBody {
    pub error: String,
}

impl Default for UnauthorizedBody {
    fn default() -> Self {
        Self {
            error: UNAUTHORIZED.to_string(),
        }
    }
}

/// Execution states as stored by a Rhythm-style engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Suspended,
    Completed,
    Failed,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
