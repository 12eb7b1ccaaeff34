//! SchedulerBuilder - scheduler の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - expect_kinds() で期待される kind を登録
//! - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
//! - 不足があれば SchedulerError::MissingTaskKinds を返す

use std::sync::{Arc, Mutex, Weak};

use crate::app::scheduler::{SchedulerInner, TaskScheduler};
use crate::config::SchedulerConfig;
use crate::domain::TaskKind;
use crate::error::SchedulerError;
use crate::graph::{BackgroundGate, HostState, SharedGraph};
use crate::ports::{
    AllowBackground, BackgroundPolicy, Clock, IdGenerator, OperationFactory, Owner, SystemClock,
    UlidGenerator,
};
use crate::runtime::{OperationRegistry, Runtime};
use crate::worker::WorkerGroup;

/// # 使用例
/// ```ignore
/// let scheduler = SchedulerBuilder::new()
///     .config(SchedulerConfig::load("tessera.toml")?)
///     .register("fetch", fetch_factory)?
///     .register("install", install_factory)?
///     .expect_kinds(&["fetch", "install"])
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    registry: OperationRegistry,
    expected_kinds: Option<Vec<String>>,
    policy: Arc<dyn BackgroundPolicy>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    owner: Option<Weak<dyn Owner>>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            registry: OperationRegistry::new(),
            expected_kinds: None,
            policy: Arc::new(AllowBackground),
            clock: Arc::new(SystemClock),
            ids: None,
            owner: None,
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for overriding `config.max_concurrency`.
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    /// Register the operation factory for a kind.
    pub fn register(
        mut self,
        kind: impl Into<TaskKind>,
        factory: impl OperationFactory + 'static,
    ) -> Result<Self, SchedulerError> {
        self.registry.register(kind.into(), Arc::new(factory))?;
        Ok(self)
    }

    /// Kinds that must have a factory by the time `build()` runs.
    pub fn expect_kinds(mut self, kinds: &[&str]) -> Self {
        self.expected_kinds = Some(kinds.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn background_policy(mut self, policy: impl BackgroundPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Defaults to a ULID generator over the configured clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Non-owning reference to whatever owns the scheduler, for log labels.
    pub fn owner(mut self, owner: Weak<dyn Owner>) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Validate and start the workers.
    ///
    /// # 検証
    /// - config の値
    /// - expect_kinds() で設定された kind が全て登録されているか
    /// - tokio runtime の中で呼ばれているか（ワーカーを spawn するため）
    pub fn build(self) -> Result<TaskScheduler, SchedulerError> {
        self.config.validate()?;

        if let Some(expected) = &self.expected_kinds {
            let registered = self.registry.registered_kinds();
            let missing: Vec<String> = expected
                .iter()
                .filter(|k| !registered.contains(*k))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(SchedulerError::MissingTaskKinds(missing));
            }
        }

        tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let config = self.config;
        let graph = SharedGraph::new(
            config.start_suspended,
            HostState {
                foreground: config.foreground,
                background_enabled: config.execute_tasks_in_background_enabled,
            },
            BackgroundGate::new(self.policy),
        );
        let runtime = Arc::new(Runtime::new(Arc::new(self.registry)));
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&self.clock))),
        };

        let workers = WorkerGroup::spawn(config.max_concurrency, graph.clone(), Arc::clone(&runtime));

        let scheduler = TaskScheduler::from_inner(SchedulerInner {
            graph,
            runtime,
            clock: self.clock,
            ids,
            owner: self.owner,
            workers: Mutex::new(Some(workers)),
            max_concurrency: config.max_concurrency,
        });
        tracing::info!(
            owner = %scheduler.owner_label(),
            workers = config.max_concurrency,
            kinds = ?scheduler.registered_kinds(),
            suspended = config.start_suspended,
            "scheduler started"
        );
        Ok(scheduler)
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
