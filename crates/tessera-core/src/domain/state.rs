//! Task status state machine.

use serde::{Deserialize, Serialize};

/// Status of a task in the graph.
///
/// State transitions:
/// - Pending -> Ready -> Executing -> Completed | Failed | Cancelled
/// - Ready <-> Suspended (suspend flag set / cleared)
/// - Ready | Suspended -> Pending (a new unsatisfied dependency was wired)
/// - Pending | Ready | Suspended -> Cancelled (explicit cancel or failed dependency)
///
/// Only the graph state moves a task between these, always under the graph lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting on dependencies, or an external operation not yet submitted.
    Pending,

    /// Dependencies satisfied; queued for a worker.
    Ready,

    /// Claimed by a worker; its operation is running.
    Executing,

    /// Would be Ready, but the graph is suspended.
    Suspended,

    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Has the task not started running yet?
    ///
    /// New dependency edges are only accepted on tasks in these states.
    pub fn is_unstarted(self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Ready | TaskStatus::Suspended
        )
    }

    /// Sitting in the ready queue (possibly held back by suspension).
    pub fn is_queued(self) -> bool {
        matches!(self, TaskStatus::Ready | TaskStatus::Suspended)
    }
}
