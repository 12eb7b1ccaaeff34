//! Node record: a task plus graph-only bookkeeping.

use crate::domain::Task;

/// One live node of the graph.
///
/// Design:
/// - The graph holds `TaskId`s in its queues and edges; this record owns the handle.
/// - A node exists from insertion until its first terminal transition.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub task: Task,

    /// External operation created but not yet submitted. Held nodes never
    /// become Ready, but they can collect dependency edges.
    pub held: bool,
}

impl NodeRecord {
    pub fn new(task: Task, held: bool) -> Self {
        Self { task, held }
    }

    pub fn release(&mut self) {
        self.held = false;
    }
}
