//! Terminal results of a task.
//!
//! A task ends with either a `TaskOutput` or a `TaskError`, never both. The
//! error is `Clone` because every holder of the task handle observes the same
//! terminal state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::TaskId;
use super::TaskStatus;
use crate::ports::network::TransportError;

/// Opaque value produced by a successful operation.
pub type TaskOutput = serde_json::Value;

/// Why a task did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// The operation itself reported a failure (transport, IO, bad data, ...).
    #[error("operation failed: {message}")]
    Operation { message: String },

    /// A dependency ended Failed or Cancelled, so this task never ran.
    #[error("dependency {dependency} did not succeed")]
    DependencyFailed { dependency: TaskId },

    #[error("cancelled")]
    Cancelled,
}

impl TaskError {
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }

    /// Terminal status a task settles into with this error.
    pub fn terminal_status(&self) -> TaskStatus {
        match self {
            TaskError::Operation { .. } => TaskStatus::Failed,
            TaskError::DependencyFailed { .. } | TaskError::Cancelled => TaskStatus::Cancelled,
        }
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        Self::operation(format!("io: {e}"))
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(e: serde_json::Error) -> Self {
        Self::operation(format!("json: {e}"))
    }
}

impl From<TransportError> for TaskError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled => TaskError::Cancelled,
            other => Self::operation(other.to_string()),
        }
    }
}

/// Terminal status for a finished result.
pub fn terminal_status(result: &Result<TaskOutput, TaskError>) -> TaskStatus {
    match result {
        Ok(_) => TaskStatus::Completed,
        Err(e) => e.terminal_status(),
    }
}
