//! Task registry: descriptor -> live task.
//!
//! The registry has no lock of its own; it lives inside `GraphState`, so
//! get-or-create and removal are serialised by the graph mutex.

use std::collections::HashMap;

use crate::domain::{Task, TaskDescriptor};

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskDescriptor, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, descriptor: &TaskDescriptor) -> Option<&Task> {
        self.tasks.get(descriptor)
    }

    /// Register a descriptor task. Returns the task already registered for
    /// the same descriptor, leaving it in place, if there is one.
    pub fn insert(&mut self, task: &Task) -> Result<(), Task> {
        let Some(descriptor) = task.descriptor() else {
            return Ok(());
        };
        match self.tasks.get(descriptor) {
            Some(existing) => Err(existing.clone()),
            None => {
                self.tasks.insert(descriptor.clone(), task.clone());
                Ok(())
            }
        }
    }

    /// Remove `task`'s entry, but only if the entry is this very task.
    pub fn remove(&mut self, task: &Task) -> bool {
        let Some(descriptor) = task.descriptor() else {
            return false;
        };
        if self.tasks.get(descriptor).is_some_and(|t| t.id() == task.id()) {
            self.tasks.remove(descriptor);
            true
        } else {
            false
        }
    }

    /// Handles of all registered tasks, oldest first.
    pub fn snapshot(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by_key(Task::id);
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
