//! Dependency graph for managing unsatisfied task dependencies.
//!
//! Design:
//! - Forward edges: task -> tasks it still waits for
//! - Reverse edges: task -> tasks waiting for it
//! - Invariant: edges and reverse_edges must be kept in sync
//!
//! Only *unsatisfied* edges live here. An edge disappears when its dependency
//! settles; the full dependency list stays on the `Task` itself.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::domain::TaskId;

/// This graph maintains both forward and reverse edges for efficient lookups:
/// - `edges`: TaskId -> Set of TaskIds it depends on
/// - `reverse_edges`: TaskId -> Set of TaskIds waiting for it
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: HashMap<TaskId, HashSet<TaskId>>,

    /// Enables O(1) lookup: "who is waiting for this task?"
    reverse_edges: HashMap<TaskId, HashSet<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency: `task` depends on `depends_on`.
    ///
    /// Example: add_dependency(task_b, task_a) means "B waits for A".
    /// No cycle check is done; callers must not create cycles.
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) {
        self.edges.entry(task).or_default().insert(depends_on);
        self.reverse_edges
            .entry(depends_on)
            .or_default()
            .insert(task);
    }

    /// Drop every outgoing edge of `task` (it settled before its dependencies did).
    pub fn clear_dependencies(&mut self, task: TaskId) {
        if let Some(deps) = self.edges.remove(&task) {
            for dep in deps {
                remove_from(&mut self.reverse_edges, dep, task);
            }
        }
    }

    /// Detach `settled` from everything waiting on it and return those waiters.
    ///
    /// Returned tasks may still have other dependencies; the caller checks
    /// `has_dependencies` before promoting them.
    pub fn take_waiting(&mut self, settled: TaskId) -> Vec<TaskId> {
        let Some(waiting) = self.reverse_edges.remove(&settled) else {
            return Vec::new();
        };
        let mut waiting: Vec<TaskId> = waiting.into_iter().collect();
        // ULIDs sort by creation time: older waiters are promoted first.
        waiting.sort();
        for &task in &waiting {
            remove_from(&mut self.edges, task, settled);
        }
        waiting
    }

    pub fn has_dependencies(&self, task: TaskId) -> bool {
        self.edges
            .get(&task)
            .map(|deps| !deps.is_empty())
            .unwrap_or(false)
    }
}

fn remove_from(map: &mut HashMap<TaskId, HashSet<TaskId>>, key: TaskId, value: TaskId) {
    if let Entry::Occupied(mut e) = map.entry(key) {
        e.get_mut().remove(&value);
        if e.get().is_empty() {
            e.remove_entry();
        }
    }
}
