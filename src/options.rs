//! Per-request execution options
//!
//! Callers may pick the task queue and the execution timeout through request
//! headers. An absent or empty header falls back to the configured queue and
//! to [`DEFAULT_EXECUTION_TIMEOUT`]. A timeout header that is present but not
//! a whole number of seconds is an error and never silently defaulted.

use anyhow::{Context, Result};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

use crate::config::WorkflowConfig;
use crate::error::GatewayError;
use crate::types::{ExecutionOptions, DEFAULT_EXECUTION_TIMEOUT};

#[derive(Debug, Clone)]
pub struct OptionResolver {
    task_queue_header: HeaderName,
    timeout_header: HeaderName,
    default_task_queue: String,
}

impl OptionResolver {
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        Ok(Self {
            task_queue_header: HeaderName::from_bytes(config.task_queue_header.as_bytes())
                .context("Invalid task queue header name")?,
            timeout_header: HeaderName::from_bytes(config.execution_timeout_header.as_bytes())
                .context("Invalid execution timeout header name")?,
            default_task_queue: config.task_queue.clone(),
        })
    }

    pub fn resolve(&self, headers: &HeaderMap) -> Result<ExecutionOptions, GatewayError> {
        let task_queue = self.task_queue(headers);
        let execution_timeout = parse_execution_timeout(headers.get(&self.timeout_header))?;
        Ok(ExecutionOptions::new(task_queue, execution_timeout))
    }

    /// Header value when non-empty, else the configured default
    pub fn task_queue(&self, headers: &HeaderMap) -> String {
        headers
            .get(&self.task_queue_header)
            .and_then(|value| value.to_str().ok())
            .filter(|queue| !queue.is_empty())
            .unwrap_or(self.default_task_queue.as_str())
            .to_string()
    }
}

/// Parse the execution timeout header as whole seconds
pub fn parse_execution_timeout(raw: Option<&HeaderValue>) -> Result<Duration, GatewayError> {
    let Some(raw) = raw.filter(|value| !value.is_empty()) else {
        return Ok(DEFAULT_EXECUTION_TIMEOUT);
    };

    std::str::from_utf8(raw.as_bytes())
        .ok()
        .and_then(|text| text.parse::<u64>().ok())
        .map(Duration::from_secs)
        .ok_or_else(|| GatewayError::InvalidTimeout {
            value: String::from_utf8_lossy(raw.as_bytes()).into_owned(),
        })
}
