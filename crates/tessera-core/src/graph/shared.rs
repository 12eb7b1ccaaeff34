//! Shared graph: `GraphState` behind a mutex, plus the wake-up plumbing.
//!
//! Locking rules:
//! - one `std::sync::Mutex`, never held across an await;
//! - operation, factory and policy code never runs while it is held;
//! - notifications are sent after the guard is dropped.

use std::pin::pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::{Task, TaskDescriptor, TaskError, TaskOutput};
use crate::error::SchedulerError;
use crate::observability::GraphCounts;

use super::gate::{BackgroundGate, HostState};
use super::state::{CancelOutcome, GraphState};
use super::wiring::EdgeOutcome;
use super::{WorkLease, WorkQueue};

enum Claim {
    Task(Task),
    Idle,
    Closed,
}

pub struct SharedGraph {
    me: Weak<SharedGraph>,
    state: Mutex<GraphState>,

    /// Blocking drain waiters.
    drained: Condvar,
    /// Async drain waiters.
    idle: Notify,
    /// Workers parked in `lease()`.
    work_available: Notify,

    gate: BackgroundGate,
}

impl SharedGraph {
    pub fn new(suspended: bool, host: HostState, gate: BackgroundGate) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            state: Mutex::new(GraphState::new(suspended, host)),
            drained: Condvar::new(),
            idle: Notify::new(),
            work_available: Notify::new(),
            gate,
        })
    }

    /// Non-owning handle given to every task created for this graph.
    pub fn handle(&self) -> Weak<SharedGraph> {
        self.me.clone()
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake parked workers, and drain waiters if nothing is executing.
    fn wake(&self, idle: bool) {
        self.work_available.notify_waiters();
        if idle {
            self.drained.notify_all();
            self.idle.notify_waiters();
        }
    }

    /// Dedup hit path: return the registered task for `descriptor`, wiring
    /// the new parent and extra dependencies onto it.
    pub fn lookup(
        &self,
        descriptor: &TaskDescriptor,
        parent: Option<&Task>,
        dependencies: &[Task],
    ) -> Result<Option<Task>, SchedulerError> {
        let (existing, report, idle) = {
            let mut state = self.lock();
            if state.is_closed() {
                return Err(SchedulerError::ShutDown);
            }
            let Some(existing) = state.registered(descriptor) else {
                return Ok(None);
            };
            let report = state.wire(&existing, parent, dependencies);
            (existing, report, state.executing() == 0)
        };
        report.log(&existing);
        self.wake(idle);
        Ok(Some(existing))
    }

    /// Insert a freshly built task and wire it.
    ///
    /// If another caller registered the same descriptor since our lookup
    /// missed, `task` is discarded and the registered one is wired and
    /// returned instead.
    pub fn insert(
        &self,
        task: Task,
        held: bool,
        parent: Option<&Task>,
        dependencies: &[Task],
    ) -> Result<Task, SchedulerError> {
        let (task, raced, report, idle) = {
            let mut state = self.lock();
            if state.is_closed() {
                return Err(SchedulerError::ShutDown);
            }
            let (task, raced) = match state.insert(task.clone(), held) {
                Ok(()) => (task, false),
                Err(existing) => (existing, true),
            };
            let report = state.wire(&task, parent, dependencies);
            (task, raced, report, state.executing() == 0)
        };
        if raced {
            tracing::debug!(task = %task, "lost insert race, reusing registered task");
        }
        report.log(&task);
        self.wake(idle);
        Ok(task)
    }

    /// Submit a held external operation.
    pub fn release(&self, task: &Task) -> Result<(), SchedulerError> {
        let released = self.lock().release(task.id());
        if !released {
            // settled while held (cancelled, or a dependency failed)
            if task.status().is_terminal() {
                tracing::debug!(task = %task, status = ?task.status(), "submit of settled operation ignored");
                return Ok(());
            }
            return Err(SchedulerError::UnknownOperation(task.id()));
        }
        self.work_available.notify_waiters();
        Ok(())
    }

    pub fn add_edge(&self, dependent: &Task, dependency: &Task) -> EdgeOutcome {
        let (outcome, idle) = {
            let mut state = self.lock();
            (state.add_edge(dependent, dependency), state.executing() == 0)
        };
        self.wake(idle);
        outcome
    }

    pub fn cancel(&self, task: &Task) {
        let (outcome, idle) = {
            let mut state = self.lock();
            (state.cancel(task), state.executing() == 0)
        };
        match outcome {
            CancelOutcome::Settled(settled) => {
                tracing::info!(task = %task, settled = settled.len(), "task cancelled");
            }
            CancelOutcome::Signalled => {
                tracing::info!(task = %task, "cancellation signalled to executing task");
            }
            CancelOutcome::AlreadyFinished => {}
        }
        self.wake(idle);
    }

    /// Record the result of an executing task.
    pub fn finish(&self, task: &Task, result: Result<TaskOutput, TaskError>) {
        let idle = {
            let mut state = self.lock();
            state.settle(task.id(), result);
            state.executing() == 0
        };
        self.wake(idle);
    }

    pub fn suspend(&self) {
        let flipped = self.lock().suspend();
        tracing::info!(held_back = flipped, "graph suspended");
    }

    pub fn resume(&self) {
        let flipped = self.lock().resume();
        tracing::info!(released = flipped, "graph resumed");
        self.work_available.notify_waiters();
    }

    pub fn is_suspended(&self) -> bool {
        self.lock().is_suspended()
    }

    /// Resolves once the executing count is zero.
    pub async fn wait_for_executing(&self) {
        loop {
            let mut idle = pin!(self.idle.notified());
            idle.as_mut().enable();
            if self.lock().executing() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Blocks the calling thread until the executing count is zero.
    pub fn wait_for_executing_blocking(&self) {
        let mut state = self.lock();
        while state.executing() > 0 {
            state = self
                .drained
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn host(&self) -> HostState {
        self.lock().host()
    }

    pub fn update_host(&self, update: impl FnOnce(&mut HostState)) {
        let host = {
            let mut state = self.lock();
            let mut host = state.host();
            update(&mut host);
            state.set_host(host);
            host
        };
        tracing::info!(
            foreground = host.foreground,
            background_enabled = host.background_enabled,
            "host state changed"
        );
        self.work_available.notify_waiters();
    }

    pub fn close(&self) {
        let (settled, signalled, idle) = {
            let mut state = self.lock();
            if state.is_closed() {
                return;
            }
            let (settled, signalled) = state.close();
            (settled, signalled, state.executing() == 0)
        };
        tracing::info!(cancelled = settled.len(), signalled, "graph closed");
        self.wake(idle);
    }

    pub fn executing(&self) -> usize {
        self.lock().executing()
    }

    pub fn registered_tasks(&self) -> Vec<Task> {
        self.lock().registered_tasks()
    }

    /// Pick a ready task the gate lets through and move it to Executing.
    ///
    /// The gate runs between two critical sections. If the host state moved
    /// in between, the decision is stale and is taken again.
    fn try_claim(&self) -> Claim {
        loop {
            let (candidates, host) = {
                let state = self.lock();
                if state.is_closed() {
                    return Claim::Closed;
                }
                (state.ready_candidates(), state.host())
            };
            if candidates.is_empty() {
                return Claim::Idle;
            }

            let permitted: Vec<Task> = candidates
                .into_iter()
                .filter(|task| self.gate.permits(task, host))
                .collect();

            let mut state = self.lock();
            if state.is_closed() {
                return Claim::Closed;
            }
            if state.host() != host {
                continue;
            }
            for task in &permitted {
                if let Some(task) = state.claim(task.id()) {
                    return Claim::Task(task);
                }
            }
            return Claim::Idle;
        }
    }
}

#[async_trait]
impl WorkQueue for SharedGraph {
    async fn lease(&self) -> Option<Box<dyn WorkLease>> {
        let graph = self.me.upgrade()?;
        loop {
            // Register interest before looking, so a wake-up between the
            // check and the await is not lost.
            let mut notified = pin!(self.work_available.notified());
            notified.as_mut().enable();

            match self.try_claim() {
                Claim::Task(task) => {
                    tracing::debug!(task = %task, operation = task.operation_name(), "task started");
                    return Some(Box::new(GraphLease {
                        task,
                        graph,
                        completed: false,
                    }));
                }
                Claim::Closed => return None,
                Claim::Idle => notified.await,
            }
        }
    }

    fn counts(&self) -> GraphCounts {
        self.lock().counts()
    }
}

/// Lease on one Executing task. Settles exactly once: through `complete`,
/// or as Cancelled when dropped without it.
struct GraphLease {
    task: Task,
    graph: Arc<SharedGraph>,
    completed: bool,
}

impl WorkLease for GraphLease {
    fn task(&self) -> &Task {
        &self.task
    }

    fn complete(mut self: Box<Self>, result: Result<TaskOutput, TaskError>) {
        self.completed = true;
        self.graph.finish(&self.task, result);
    }
}

impl Drop for GraphLease {
    fn drop(&mut self) {
        if !self.completed {
            self.graph.finish(&self.task, Err(TaskError::Cancelled));
        }
    }
}
