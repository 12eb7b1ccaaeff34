use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::domain::{Task, TaskDescriptor, TaskError, TaskKind, TaskOutput};
use crate::error::SchedulerError;
use crate::ports::{Operation, OperationContext, OperationFactory};

/// Registry of operation factories (kind -> factory).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable).
#[derive(Default)]
pub struct OperationRegistry {
    factories: HashMap<TaskKind, Arc<dyn OperationFactory>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: TaskKind,
        factory: Arc<dyn OperationFactory>,
    ) -> Result<(), SchedulerError> {
        if self.factories.contains_key(&kind) {
            return Err(SchedulerError::DuplicateFactory(kind));
        }
        self.factories.insert(kind, factory);
        Ok(())
    }

    pub fn get(&self, kind: &TaskKind) -> Option<&Arc<dyn OperationFactory>> {
        self.factories.get(kind)
    }

    pub fn registered_kinds(&self) -> BTreeSet<String> {
        self.factories.keys().map(|k| k.as_str().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Runtime builds operations for descriptors and runs them for workers.
pub struct Runtime {
    registry: Arc<OperationRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Build the operation for a descriptor.
    pub fn instantiate(
        &self,
        descriptor: &TaskDescriptor,
        input: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn Operation>, SchedulerError> {
        let factory = self
            .registry
            .get(descriptor.kind())
            .ok_or_else(|| SchedulerError::UnknownTaskKind(descriptor.kind().clone()))?;
        Ok(factory.create(descriptor, input))
    }

    /// Run one task's operation.
    ///
    /// The operation runs on its own tokio task so a panic becomes a failure
    /// of this task only. Cancelling the task's token aborts it.
    pub async fn execute(&self, task: &Task) -> Result<TaskOutput, TaskError> {
        let cancel = task.cancellation();
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let operation = task.operation();
        let ctx = OperationContext::new(task.clone());
        let mut handle = tokio::spawn(async move { operation.run(ctx).await });

        tokio::select! {
            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(TaskError::operation("operation panicked")),
                Err(_) => Err(TaskError::Cancelled),
            },
            _ = cancel.cancelled() => {
                handle.abort();
                Err(TaskError::Cancelled)
            }
        }
    }
}
