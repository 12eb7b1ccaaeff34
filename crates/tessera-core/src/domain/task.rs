//! Task handle.
//!
//! A `Task` is a cheap-to-clone shared handle; every caller that requested the
//! same descriptor holds a clone of the same handle. Status changes are made by
//! the graph only (under its lock); holders observe them through `status()` and
//! `wait()`.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::outcome::terminal_status;
use super::{TaskDescriptor, TaskError, TaskId, TaskOutput, TaskStatus};
use crate::graph::SharedGraph;
use crate::ports::Operation;

#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

struct TaskInner {
    id: TaskId,
    /// `None` for external operations.
    descriptor: Option<TaskDescriptor>,
    input: Option<serde_json::Value>,
    operation: Arc<dyn Operation>,
    created_at: DateTime<Utc>,
    status: watch::Sender<TaskStatus>,
    outcome: OnceLock<Result<TaskOutput, TaskError>>,
    /// Every dependency ever wired onto this task, satisfied or not.
    dependencies: Mutex<Vec<Task>>,
    cancel: CancellationToken,
    graph: Weak<SharedGraph>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        descriptor: Option<TaskDescriptor>,
        input: Option<serde_json::Value>,
        operation: Arc<dyn Operation>,
        created_at: DateTime<Utc>,
        graph: Weak<SharedGraph>,
    ) -> Self {
        let (status, _) = watch::channel(TaskStatus::Pending);
        Self {
            inner: Arc::new(TaskInner {
                id,
                descriptor,
                input,
                operation,
                created_at,
                status,
                outcome: OnceLock::new(),
                dependencies: Mutex::new(Vec::new()),
                cancel: CancellationToken::new(),
                graph,
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn descriptor(&self) -> Option<&TaskDescriptor> {
        self.inner.descriptor.as_ref()
    }

    pub fn input(&self) -> Option<&serde_json::Value> {
        self.inner.input.as_ref()
    }

    pub fn status(&self) -> TaskStatus {
        *self.inner.status.borrow()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Name of the bound operation, used in logs.
    pub fn operation_name(&self) -> &str {
        self.inner.operation.name()
    }

    pub fn is_network_bound(&self) -> bool {
        self.inner.operation.is_network_bound()
    }

    /// Terminal result, once the task has settled.
    pub fn outcome(&self) -> Option<Result<TaskOutput, TaskError>> {
        self.inner.outcome.get().cloned()
    }

    /// Output of a Completed task.
    pub fn output(&self) -> Option<TaskOutput> {
        match self.inner.outcome.get() {
            Some(Ok(output)) => Some(output.clone()),
            _ => None,
        }
    }

    /// Stored error of a Failed or Cancelled task.
    pub fn error(&self) -> Option<TaskError> {
        match self.inner.outcome.get() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// Snapshot of the tasks this one waits on (or waited on).
    pub fn dependencies(&self) -> Vec<Task> {
        self.deps().clone()
    }

    /// Token cancelled when this task is cancelled or settles.
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Cancel this task and, transitively, everything depending on it.
    ///
    /// Unstarted tasks settle immediately. An executing task has its token
    /// cancelled and settles once its worker observes that.
    pub fn cancel(&self) {
        match self.inner.graph.upgrade() {
            Some(graph) => graph.cancel(self),
            None => self.inner.cancel.cancel(),
        }
    }

    /// Wait for the terminal state and return the stored result.
    pub async fn wait(&self) -> Result<TaskOutput, TaskError> {
        let mut rx = self.inner.status.subscribe();
        // The sender lives in `inner`, which we hold; the channel cannot close.
        let _ = rx.wait_for(|status| status.is_terminal()).await;
        self.outcome().unwrap_or(Err(TaskError::Cancelled))
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id(),
            descriptor: self.inner.descriptor.clone(),
            operation: self.operation_name().to_string(),
            status: self.status(),
            created_at: self.created_at(),
            dependencies: self.deps().iter().map(Task::id).collect(),
            error: self.error().map(|e| e.to_string()),
        }
    }

    pub(crate) fn operation(&self) -> Arc<dyn Operation> {
        Arc::clone(&self.inner.operation)
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        self.inner.status.send_replace(status);
    }

    pub(crate) fn push_dependency(&self, dependency: Task) {
        let mut deps = self.deps();
        if !deps.iter().any(|d| d.id() == dependency.id()) {
            deps.push(dependency);
        }
    }

    /// Store the terminal result, then publish the terminal status.
    ///
    /// The outcome is written first so a woken `wait()` always finds it.
    /// Returns the terminal status, or `None` if the task had already settled.
    pub(crate) fn finish(&self, result: Result<TaskOutput, TaskError>) -> Option<TaskStatus> {
        let status = terminal_status(&result);
        self.inner.outcome.set(result).ok()?;
        self.inner.cancel.cancel();
        self.set_status(status);
        Some(status)
    }

    fn deps(&self) -> std::sync::MutexGuard<'_, Vec<Task>> {
        self.inner
            .dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("descriptor", &self.inner.descriptor)
            .field("operation", &self.operation_name())
            .field("status", &self.status())
            .finish()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.descriptor {
            Some(descriptor) => write!(f, "{descriptor}"),
            None => write!(f, "{}({})", self.operation_name(), self.inner.id),
        }
    }
}

/// Serialisable read-only view of a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<TaskDescriptor>,
    pub operation: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub dependencies: Vec<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
