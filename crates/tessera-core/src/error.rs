use thiserror::Error;

use crate::domain::{TaskId, TaskKind};

/// Synchronous errors from scheduling and setup calls.
///
/// Task-level failures never show up here; they are stored on the task.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("no operation factory registered for kind={0}")]
    UnknownTaskKind(TaskKind),

    #[error("duplicate operation factory for kind={0}")]
    DuplicateFactory(TaskKind),

    #[error("missing task kinds: {0:?}. These kinds were expected but not registered.")]
    MissingTaskKinds(Vec<String>),

    #[error("{0} is not a held external operation of this scheduler")]
    UnknownOperation(TaskId),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("scheduler must be built inside a tokio runtime")]
    NoRuntime,

    #[error("scheduler is shut down")]
    ShutDown,
}
