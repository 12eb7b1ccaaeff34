//! Background-execution gate.
//!
//! Decides whether a ready task may start given the host state. Orthogonal to
//! the dependency graph: it only affects *when* a task starts.

use std::sync::Arc;

use crate::domain::Task;
use crate::ports::BackgroundPolicy;

/// Host-side inputs to the gate. Lives in `GraphState` so a claim can verify
/// it did not change between the gate decision and the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostState {
    pub foreground: bool,
    pub background_enabled: bool,
}

pub struct BackgroundGate {
    policy: Arc<dyn BackgroundPolicy>,
}

impl BackgroundGate {
    pub fn new(policy: Arc<dyn BackgroundPolicy>) -> Self {
        Self { policy }
    }

    /// May `task` start now?
    ///
    /// Foreground hosts and non-network tasks always pass. Otherwise both the
    /// scheduler-wide flag and the policy must agree; the policy is not
    /// consulted when the flag is off. Must be called without the graph lock.
    pub fn permits(&self, task: &Task, host: HostState) -> bool {
        if host.foreground || !task.is_network_bound() {
            return true;
        }
        host.background_enabled && self.policy.should_execute_in_background(task)
    }
}
