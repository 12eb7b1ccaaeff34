//! Task graph: registry, dependency edges, suspend state, ready queue.
//!
//! Workers see the graph only through `WorkQueue` / `WorkLease`.

mod dependency;
mod gate;
mod record;
mod registry;
mod shared;
mod state;
mod wiring;

pub use dependency::DependencyGraph;
pub use gate::{BackgroundGate, HostState};
pub use record::NodeRecord;
pub use registry::TaskRegistry;
pub use shared::SharedGraph;
pub use state::{CancelOutcome, GraphState};
pub use wiring::{EdgeOutcome, RejectedEdge, WireReport};

use async_trait::async_trait;

use crate::domain::{Task, TaskError, TaskOutput};
use crate::observability::GraphCounts;

/// A leased task for processing.
/// The worker owns this lease and must report the result through `complete`.
///
/// Design intent:
/// - The graph manages status transitions (Ready -> Executing -> terminal).
/// - Worker/Runtime runs the operation and reports the result.
/// - Dropping a lease without completing it settles the task as Cancelled.
pub trait WorkLease: Send {
    fn task(&self) -> &Task;

    fn complete(self: Box<Self>, result: Result<TaskOutput, TaskError>);
}

/// Execution-side port of the graph.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Lease one task that may start now (waits until there is one, or
    /// returns None once the graph is closed).
    async fn lease(&self) -> Option<Box<dyn WorkLease>>;

    /// Observability hook.
    fn counts(&self) -> GraphCounts;
}
