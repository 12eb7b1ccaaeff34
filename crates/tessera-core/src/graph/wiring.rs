//! Dependency wiring.
//!
//! Two independent relations are established for a requested task:
//! - task -> each extra dependency (the task waits on them)
//! - parent -> task (the parent waits on the task)
//!
//! Edges are only accepted on dependents that have not started. Once a task
//! is Executing or terminal a new edge could not block it anymore, so the
//! edge is rejected and the task is left unchanged.

use crate::domain::{Task, TaskError, TaskStatus};

use super::state::GraphState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// Dependency is live; the dependent now waits for it.
    Added,
    /// Dependency already completed; recorded, nothing to wait for.
    Satisfied,
    /// Dependency already failed or was cancelled; the dependent was
    /// cancelled (and the cancellation cascaded).
    DependencyFailed,
    /// Dependent is executing, terminal, or not part of this graph.
    DependentStarted,
    /// Dependency is live but belongs to no node of this graph.
    DependencyUnknown,
    /// A task cannot wait on itself.
    SelfDependency,
}

impl EdgeOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            EdgeOutcome::Added | EdgeOutcome::Satisfied | EdgeOutcome::DependencyFailed
        )
    }
}

/// Edge that `wire` refused, kept so it can be logged once the graph
/// lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEdge {
    pub dependent: Task,
    pub dependency: Task,
    pub outcome: EdgeOutcome,
}

/// What one `wire` call did to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireReport {
    pub added: usize,
    pub satisfied: usize,
    pub failed: usize,
    pub rejected: Vec<RejectedEdge>,
}

impl WireReport {
    fn record(&mut self, dependent: &Task, dependency: &Task, outcome: EdgeOutcome) {
        match outcome {
            EdgeOutcome::Added => self.added += 1,
            EdgeOutcome::Satisfied => self.satisfied += 1,
            EdgeOutcome::DependencyFailed => self.failed += 1,
            EdgeOutcome::DependentStarted
            | EdgeOutcome::DependencyUnknown
            | EdgeOutcome::SelfDependency => self.rejected.push(RejectedEdge {
                dependent: dependent.clone(),
                dependency: dependency.clone(),
                outcome,
            }),
        }
    }

    /// Emit the report. Formats tasks, so call it without the graph lock.
    pub fn log(&self, task: &Task) {
        for edge in &self.rejected {
            tracing::warn!(
                dependent = %edge.dependent,
                dependency = %edge.dependency,
                outcome = ?edge.outcome,
                "dependency edge rejected"
            );
        }
        tracing::debug!(
            task = %task,
            added = self.added,
            satisfied = self.satisfied,
            failed = self.failed,
            rejected = self.rejected.len(),
            "task wired"
        );
    }
}

impl GraphState {
    /// `dependent` must not start before `dependency` succeeds.
    pub fn add_edge(&mut self, dependent: &Task, dependency: &Task) -> EdgeOutcome {
        let dependent_id = dependent.id();
        let dependency_id = dependency.id();

        let started = self
            .nodes
            .get(&dependent_id)
            .is_none_or(|node| !node.task.status().is_unstarted());
        if started {
            return EdgeOutcome::DependentStarted;
        }
        if dependent_id == dependency_id {
            return EdgeOutcome::SelfDependency;
        }

        match dependency.status() {
            TaskStatus::Completed => {
                dependent.push_dependency(dependency.clone());
                EdgeOutcome::Satisfied
            }
            TaskStatus::Failed | TaskStatus::Cancelled => {
                dependent.push_dependency(dependency.clone());
                self.settle(
                    dependent_id,
                    Err(TaskError::DependencyFailed {
                        dependency: dependency_id,
                    }),
                );
                EdgeOutcome::DependencyFailed
            }
            _ if !self.contains(dependency_id) => EdgeOutcome::DependencyUnknown,
            _ => {
                dependent.push_dependency(dependency.clone());
                self.edges.add_dependency(dependent_id, dependency_id);
                self.demote(dependent_id);
                EdgeOutcome::Added
            }
        }
    }

    /// Wire `task` onto its extra dependencies, make it ready if it can be,
    /// then make `parent` wait on it.
    ///
    /// Used both for freshly inserted tasks and for dedup hits. Rejected
    /// edges leave the graph unchanged and are returned in the report.
    pub fn wire(&mut self, task: &Task, parent: Option<&Task>, dependencies: &[Task]) -> WireReport {
        let mut report = WireReport::default();

        for dependency in dependencies {
            let outcome = self.add_edge(task, dependency);
            report.record(task, dependency, outcome);
        }
        self.promote_if_ready(task.id());

        if let Some(parent) = parent {
            let outcome = self.add_edge(parent, task);
            report.record(parent, task, outcome);
        }
        report
    }
}
