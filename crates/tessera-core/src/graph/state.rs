//! Graph state: every piece of shared mutable scheduler state.
//!
//! `GraphState` is plain data guarded by one mutex in `SharedGraph`. Nothing
//! here awaits, and nothing here calls into operation, factory or policy code.
//! All task status transitions happen in this file or in `wiring`.

use std::collections::{HashMap, VecDeque};

use crate::domain::{Task, TaskDescriptor, TaskError, TaskId, TaskOutput, TaskStatus};
use crate::observability::GraphCounts;

use super::dependency::DependencyGraph;
use super::gate::HostState;
use super::record::NodeRecord;
use super::registry::TaskRegistry;

/// Result of `GraphState::cancel`.
#[derive(Debug)]
pub enum CancelOutcome {
    /// Task (and whatever depended on it) reached Cancelled.
    Settled(Vec<Task>),
    /// Task is executing; its token was cancelled and it settles when its
    /// worker returns.
    Signalled,
    /// Task had already settled, or belongs to no graph we know.
    AlreadyFinished,
}

#[derive(Debug)]
pub struct GraphState {
    pub(super) nodes: HashMap<TaskId, NodeRecord>,
    pub(super) edges: DependencyGraph,
    pub(super) registry: TaskRegistry,

    /// Ready queue (TaskIds only). Holds Ready and Suspended tasks.
    pub(super) ready: VecDeque<TaskId>,

    suspended: bool,
    executing: usize,
    host: HostState,
    closed: bool,
}

impl GraphState {
    pub fn new(suspended: bool, host: HostState) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: DependencyGraph::new(),
            registry: TaskRegistry::new(),
            ready: VecDeque::new(),
            suspended,
            executing: 0,
            host,
            closed: false,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn executing(&self) -> usize {
        self.executing
    }

    pub fn host(&self) -> HostState {
        self.host
    }

    pub fn set_host(&mut self, host: HostState) {
        self.host = host;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn registered(&self, descriptor: &TaskDescriptor) -> Option<Task> {
        self.registry.get(descriptor).cloned()
    }

    pub fn registered_tasks(&self) -> Vec<Task> {
        self.registry.snapshot()
    }

    /// Add a new Pending node.
    ///
    /// Descriptor tasks are registered in the same step; if the descriptor is
    /// already taken the node is not added and the registered task is returned.
    pub fn insert(&mut self, task: Task, held: bool) -> Result<(), Task> {
        self.registry.insert(&task)?;
        self.nodes.insert(task.id(), NodeRecord::new(task, held));
        Ok(())
    }

    /// Submit a held external operation. Returns false if `id` is not held.
    pub fn release(&mut self, id: TaskId) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if node.held => node.release(),
            _ => return false,
        }
        self.promote_if_ready(id);
        true
    }

    /// Pending -> Ready (or Suspended) once nothing is left to wait for.
    pub fn promote_if_ready(&mut self, id: TaskId) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if node.held || node.task.status() != TaskStatus::Pending || self.edges.has_dependencies(id)
        {
            return false;
        }
        let status = if self.suspended {
            TaskStatus::Suspended
        } else {
            TaskStatus::Ready
        };
        node.task.set_status(status);
        self.ready.push_back(id);
        true
    }

    /// Ready | Suspended -> Pending, because a new unsatisfied edge was added.
    pub(super) fn demote(&mut self, id: TaskId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if node.task.status().is_queued() {
            node.task.set_status(TaskStatus::Pending);
            self.ready.retain(|r| *r != id);
        }
    }

    /// Tasks a worker could claim right now, in queue order.
    pub fn ready_candidates(&self) -> Vec<Task> {
        if self.suspended || self.closed {
            return Vec::new();
        }
        self.ready
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| node.task.status() == TaskStatus::Ready)
            .map(|node| node.task.clone())
            .collect()
    }

    /// Ready -> Executing. The suspend flag is re-checked here, under the
    /// same lock `suspend()` takes.
    pub fn claim(&mut self, id: TaskId) -> Option<Task> {
        if self.suspended || self.closed {
            return None;
        }
        let node = self.nodes.get_mut(&id)?;
        if node.task.status() != TaskStatus::Ready {
            return None;
        }
        self.ready.retain(|r| *r != id);
        node.task.set_status(TaskStatus::Executing);
        self.executing += 1;
        Some(node.task.clone())
    }

    /// First terminal transition of `id`, cascading to dependents.
    ///
    /// Success promotes dependents that have nothing else to wait for;
    /// failure or cancellation settles every transitive dependent as
    /// `DependencyFailed`. The executing count is decremented in the same
    /// step as the transition. Returns every task that settled.
    pub fn settle(&mut self, id: TaskId, result: Result<TaskOutput, TaskError>) -> Vec<Task> {
        let mut settled = Vec::new();
        let mut work = vec![(id, result)];

        while let Some((id, result)) = work.pop() {
            let Some(node) = self.nodes.remove(&id) else {
                continue;
            };
            let task = node.task;
            let was_executing = task.status() == TaskStatus::Executing;

            self.ready.retain(|r| *r != id);
            self.registry.remove(&task);
            self.edges.clear_dependencies(id);
            let waiting = self.edges.take_waiting(id);

            let succeeded = result.is_ok();
            let Some(status) = task.finish(result) else {
                continue;
            };
            if was_executing {
                self.executing = self.executing.saturating_sub(1);
            }
            tracing::debug!(id = %id, descriptor = ?task.descriptor(), ?status, "task settled");

            for dependent in waiting {
                if succeeded {
                    self.promote_if_ready(dependent);
                } else {
                    work.push((dependent, Err(TaskError::DependencyFailed { dependency: id })));
                }
            }
            settled.push(task);
        }
        settled
    }

    pub fn cancel(&mut self, task: &Task) -> CancelOutcome {
        let id = task.id();
        let Some(node) = self.nodes.get(&id) else {
            return CancelOutcome::AlreadyFinished;
        };
        if node.task.status() == TaskStatus::Executing {
            node.task.cancellation().cancel();
            return CancelOutcome::Signalled;
        }
        CancelOutcome::Settled(self.settle(id, Err(TaskError::Cancelled)))
    }

    /// Set the suspend flag; queued Ready tasks show as Suspended.
    pub fn suspend(&mut self) -> usize {
        self.suspended = true;
        self.flip_queued(TaskStatus::Ready, TaskStatus::Suspended)
    }

    /// Clear the suspend flag; Suspended tasks become Ready again.
    pub fn resume(&mut self) -> usize {
        self.suspended = false;
        self.flip_queued(TaskStatus::Suspended, TaskStatus::Ready)
    }

    fn flip_queued(&mut self, from: TaskStatus, to: TaskStatus) -> usize {
        let mut flipped = 0;
        for id in &self.ready {
            if let Some(node) = self.nodes.get_mut(id)
                && node.task.status() == from
            {
                node.task.set_status(to);
                flipped += 1;
            }
        }
        flipped
    }

    /// Stop accepting work: settle every unstarted node as Cancelled and
    /// signal every executing one. Returns (settled, signalled).
    pub fn close(&mut self) -> (Vec<Task>, usize) {
        self.closed = true;

        let mut ids: Vec<TaskId> = self.nodes.keys().copied().collect();
        ids.sort();

        let mut settled = Vec::new();
        let mut signalled = 0;
        for id in ids {
            let Some(node) = self.nodes.get(&id) else {
                continue; // already settled by a cascade
            };
            if node.task.status() == TaskStatus::Executing {
                node.task.cancellation().cancel();
                signalled += 1;
            } else {
                settled.extend(self.settle(id, Err(TaskError::Cancelled)));
            }
        }
        (settled, signalled)
    }

    pub fn counts(&self) -> GraphCounts {
        let mut counts = GraphCounts {
            registered: self.registry.len(),
            ..GraphCounts::default()
        };
        for node in self.nodes.values() {
            match node.task.status() {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Ready => counts.ready += 1,
                TaskStatus::Suspended => counts.suspended += 1,
                TaskStatus::Executing => counts.executing += 1,
                TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {}
            }
        }
        counts
    }
}
