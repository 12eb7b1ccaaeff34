//! Operation port - 実際の処理（download / verify / install ...）
//!
//! The scheduler never looks inside an operation. It only starts it, cancels
//! it through the task's token, and stores what `run` returns.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{Task, TaskDescriptor, TaskError, TaskOutput};

/// One schedulable unit of work.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Short name for logs and snapshots.
    fn name(&self) -> &str;

    /// Network-bound operations are subject to the background gate.
    fn is_network_bound(&self) -> bool {
        false
    }

    /// Run to completion. Long operations should watch `ctx.cancellation()`;
    /// the runtime also aborts the future when the task is cancelled.
    async fn run(&self, ctx: OperationContext) -> Result<TaskOutput, TaskError>;
}

/// What an operation gets to see while it runs.
pub struct OperationContext {
    task: Task,
}

impl OperationContext {
    pub(crate) fn new(task: Task) -> Self {
        Self { task }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn input(&self) -> Option<&serde_json::Value> {
        self.task.input()
    }

    pub fn dependencies(&self) -> Vec<Task> {
        self.task.dependencies()
    }

    /// Output of the first completed dependency of the given kind.
    pub fn dependency_output(&self, kind: &str) -> Option<TaskOutput> {
        self.task
            .dependencies()
            .iter()
            .filter(|dep| dep.descriptor().is_some_and(|d| d.kind().as_str() == kind))
            .find_map(Task::output)
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.task.cancellation()
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.cancellation().is_cancelled()
    }
}

/// Builds the operation for a descriptor on a registry miss.
///
/// Factories run outside the graph lock and may be called for a request that
/// then loses a dedup race; they must not have side effects beyond
/// construction.
pub trait OperationFactory: Send + Sync {
    fn create(
        &self,
        descriptor: &TaskDescriptor,
        input: Option<&serde_json::Value>,
    ) -> Arc<dyn Operation>;
}

impl<F> OperationFactory for F
where
    F: Fn(&TaskDescriptor, Option<&serde_json::Value>) -> Arc<dyn Operation> + Send + Sync,
{
    fn create(
        &self,
        descriptor: &TaskDescriptor,
        input: Option<&serde_json::Value>,
    ) -> Arc<dyn Operation> {
        self(descriptor, input)
    }
}
