//! Test helpers: detached tasks, scripted operations, a recorder of
//! what ran, and tracing/timeouts.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Once, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing_subscriber::{EnvFilter, fmt};

use crate::app::{SchedulerBuilder, TaskScheduler};
use crate::domain::{Task, TaskDescriptor, TaskError, TaskId, TaskOutput};
use crate::ports::{Operation, OperationContext};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Uses `with_test_writer()`, so output shows only for failing tests.
/// Enable levels with e.g. `RUST_LOG=tessera_core=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Poll `cond` until it holds (5-second limit).
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    with_timeout(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// Parse a descriptor from its text form.
pub fn d(text: &str) -> TaskDescriptor {
    text.parse().expect("valid descriptor")
}

/// Operation defined by a synchronous closure.
pub struct FnOperation {
    name: String,
    network: bool,
    f: Box<dyn Fn(&OperationContext) -> Result<TaskOutput, TaskError> + Send + Sync>,
}

impl FnOperation {
    pub fn new(
        name: &str,
        f: impl Fn(&OperationContext) -> Result<TaskOutput, TaskError> + Send + Sync + 'static,
    ) -> Arc<dyn Operation> {
        Arc::new(Self {
            name: name.to_string(),
            network: false,
            f: Box::new(f),
        })
    }

    pub fn network(name: &str) -> Arc<dyn Operation> {
        Arc::new(Self {
            name: name.to_string(),
            network: true,
            f: Box::new(|_| Ok(TaskOutput::Null)),
        })
    }
}

#[async_trait]
impl Operation for FnOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_network_bound(&self) -> bool {
        self.network
    }

    async fn run(&self, ctx: OperationContext) -> Result<TaskOutput, TaskError> {
        (self.f)(&ctx)
    }
}

pub fn noop_operation(name: &str) -> Arc<dyn Operation> {
    FnOperation::new(name, |_| Ok(TaskOutput::Null))
}

/// Operation that never finishes on its own.
pub fn pending_operation(name: &str) -> Arc<dyn Operation> {
    struct Pending(String);

    #[async_trait]
    impl Operation for Pending {
        fn name(&self) -> &str {
            &self.0
        }

        async fn run(&self, _ctx: OperationContext) -> Result<TaskOutput, TaskError> {
            std::future::pending().await
        }
    }

    Arc::new(Pending(name.to_string()))
}

/// Task that belongs to no graph.
pub fn detached_task_with(text: &str, operation: Arc<dyn Operation>) -> Task {
    Task::new(
        TaskId::generate(),
        Some(d(text)),
        None,
        operation,
        Utc::now(),
        Weak::new(),
    )
}

pub fn detached_task(text: &str) -> Task {
    let descriptor = d(text);
    detached_task_with(text, noop_operation(descriptor.kind().as_str()))
}

pub fn detached_network_task(text: &str) -> Task {
    let descriptor = d(text);
    detached_task_with(text, FnOperation::network(descriptor.kind().as_str()))
}

/// External operation (no descriptor) that belongs to no graph.
pub fn detached_operation(name: &str) -> Task {
    Task::new(
        TaskId::generate(),
        None,
        None,
        noop_operation(name),
        Utc::now(),
        Weak::new(),
    )
}

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    /// Succeed right away.
    Instant,
    /// Wait until `Recorder::release` is called for the label.
    Gated,
    /// Fail with `operation failed: boom`.
    Fail,
}

/// Records which operations started, in order, and holds their gates.
#[derive(Default)]
pub struct Recorder {
    started: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn has_started(&self, label: &str) -> bool {
        self.runs(label) > 0
    }

    pub fn runs(&self, label: &str) -> usize {
        self.started
            .lock()
            .unwrap()
            .iter()
            .filter(|s| *s == label)
            .count()
    }

    /// Let one gated run of `label` finish.
    pub fn release(&self, label: &str) {
        self.gate(label).add_permits(1);
    }

    fn gate(&self, label: &str) -> Arc<Semaphore> {
        let mut gates = self.gates.lock().unwrap();
        Arc::clone(
            gates
                .entry(label.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(0))),
        )
    }

    /// External operation labelled `label`.
    pub fn operation(self: &Arc<Self>, label: &str, behaviour: Behaviour) -> Arc<dyn Operation> {
        Arc::new(RecordedOperation {
            label: label.to_string(),
            behaviour,
            network: false,
            recorder: Arc::clone(self),
        })
    }

    /// Builder with the recorder kinds registered:
    /// `instant`, `gated`, `failing` (local) and `net` (network-bound, instant).
    pub fn builder(self: &Arc<Self>, max_concurrency: usize) -> SchedulerBuilder {
        init_tracing();
        let kinds = [
            ("instant", Behaviour::Instant, false),
            ("gated", Behaviour::Gated, false),
            ("failing", Behaviour::Fail, false),
            ("net", Behaviour::Instant, true),
        ];
        let mut builder = SchedulerBuilder::new().max_concurrency(max_concurrency);
        for (kind, behaviour, network) in kinds {
            let recorder = Arc::clone(self);
            builder = builder
                .register(
                    kind,
                    move |descriptor: &TaskDescriptor,
                          _: Option<&serde_json::Value>|
                          -> Arc<dyn Operation> {
                        Arc::new(RecordedOperation {
                            label: descriptor.to_string(),
                            behaviour,
                            network,
                            recorder: Arc::clone(&recorder),
                        })
                    },
                )
                .unwrap();
        }
        builder
    }

    pub fn scheduler(self: &Arc<Self>, max_concurrency: usize) -> TaskScheduler {
        self.builder(max_concurrency).build().unwrap()
    }

    fn record(&self, label: &str) {
        self.started.lock().unwrap().push(label.to_string());
    }
}

struct RecordedOperation {
    label: String,
    behaviour: Behaviour,
    network: bool,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Operation for RecordedOperation {
    fn name(&self) -> &str {
        &self.label
    }

    fn is_network_bound(&self) -> bool {
        self.network
    }

    async fn run(&self, _ctx: OperationContext) -> Result<TaskOutput, TaskError> {
        self.recorder.record(&self.label);
        match self.behaviour {
            Behaviour::Instant => Ok(serde_json::json!({ "label": self.label })),
            Behaviour::Gated => {
                let gate = self.recorder.gate(&self.label);
                let _permit = gate.acquire().await.map_err(|_| TaskError::Cancelled)?;
                Ok(serde_json::json!({ "label": self.label }))
            }
            Behaviour::Fail => Err(TaskError::operation("boom")),
        }
    }
}
