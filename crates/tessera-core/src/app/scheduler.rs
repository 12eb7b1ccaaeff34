//! TaskScheduler - the façade callers talk to.
//!
//! Owns the graph (registry + edges + suspend state), the runtime and the
//! worker group. Every call here is non-blocking except
//! `suspend_all_and_wait_for_executing_blocking`.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::domain::{Task, TaskDescriptor, TaskSnapshot};
use crate::error::SchedulerError;
use crate::graph::{SharedGraph, WorkQueue};
use crate::observability::GraphCounts;
use crate::ports::{Clock, IdGenerator, Operation, Owner};
use crate::runtime::Runtime;
use crate::worker::WorkerGroup;

/// A request for the task identified by `descriptor`.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    descriptor: TaskDescriptor,
    input: Option<serde_json::Value>,
    parent: Option<Task>,
    dependencies: Vec<Task>,
}

impl TaskRequest {
    pub fn new(descriptor: TaskDescriptor) -> Self {
        Self {
            descriptor,
            input: None,
            parent: None,
            dependencies: Vec::new(),
        }
    }

    /// Caller payload, used only when the request creates the task.
    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }

    /// `parent` will wait for the requested task.
    pub fn with_parent(mut self, parent: &Task) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// The requested task will wait for `dependency`.
    pub fn depends_on(mut self, dependency: &Task) -> Self {
        self.dependencies.push(dependency.clone());
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = Task>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }
}

/// Cheap-to-clone handle; all clones share one graph.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

pub(crate) struct SchedulerInner {
    pub(crate) graph: Arc<SharedGraph>,
    pub(crate) runtime: Arc<Runtime>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) owner: Option<Weak<dyn Owner>>,
    pub(crate) workers: Mutex<Option<WorkerGroup>>,
    pub(crate) max_concurrency: usize,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        self.graph.close();
        let workers = self
            .workers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(workers) = workers {
            workers.request_shutdown();
        }
    }
}

impl TaskScheduler {
    pub(crate) fn from_inner(inner: SchedulerInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Return the live task for the request's descriptor, or create,
    /// wire and schedule a new one.
    ///
    /// - Hit: the registered task is returned. A requested parent is made to
    ///   wait on it, and extra dependencies are wired onto it while it has
    ///   not started executing; afterwards they are rejected (logged) and
    ///   the task is returned unchanged.
    /// - Miss: a task is built from the kind's factory, wired, registered
    ///   and queued.
    ///
    /// Concurrent requests for one descriptor always get the same task.
    /// Fails only for unknown kinds or after shutdown; execution failures
    /// are reported on the task.
    pub fn get_or_create_task(&self, request: TaskRequest) -> Result<Task, SchedulerError> {
        let TaskRequest {
            descriptor,
            input,
            parent,
            dependencies,
        } = request;
        let graph = &self.inner.graph;

        if let Some(existing) = graph.lookup(&descriptor, parent.as_ref(), &dependencies)? {
            tracing::debug!(owner = %self.owner_label(), task = %existing, status = ?existing.status(), "returning in-flight task");
            return Ok(existing);
        }

        // Factory code runs without the graph lock; a concurrent request may
        // register the descriptor first, in which case ours is dropped.
        let operation = self.inner.runtime.instantiate(&descriptor, input.as_ref())?;
        let task = Task::new(
            self.inner.ids.generate_task_id(),
            Some(descriptor),
            input,
            operation,
            self.inner.clock.now(),
            graph.handle(),
        );
        let registered = graph.insert(task.clone(), false, parent.as_ref(), &dependencies)?;
        if registered == task {
            tracing::info!(
                owner = %self.owner_label(),
                task = %registered,
                id = %registered.id(),
                dependencies = dependencies.len(),
                status = ?registered.status(),
                "task created"
            );
        }
        Ok(registered)
    }

    pub fn queue_task(&self, descriptor: TaskDescriptor) -> Result<Task, SchedulerError> {
        self.get_or_create_task(TaskRequest::new(descriptor))
    }

    pub fn queue_task_with_input(
        &self,
        descriptor: TaskDescriptor,
        input: serde_json::Value,
    ) -> Result<Task, SchedulerError> {
        self.get_or_create_task(TaskRequest::new(descriptor).with_input(input))
    }

    pub fn queue_task_with_dependencies(
        &self,
        descriptor: TaskDescriptor,
        input: Option<serde_json::Value>,
        dependencies: Vec<Task>,
    ) -> Result<Task, SchedulerError> {
        let mut request = TaskRequest::new(descriptor).with_dependencies(dependencies);
        request.input = input;
        self.get_or_create_task(request)
    }

    /// Create an external operation, held in Pending until
    /// `submit_external_operation`. Not deduplicated; usable as a parent.
    pub fn create_operation(&self, operation: Arc<dyn Operation>) -> Result<Task, SchedulerError> {
        let task = self.external(operation);
        self.inner.graph.insert(task.clone(), true, None, &[])?;
        tracing::debug!(owner = %self.owner_label(), task = %task, "external operation created");
        Ok(task)
    }

    /// Hand a held external operation to the workers. It still waits for
    /// its dependencies, the suspend flag and the background gate.
    pub fn submit_external_operation(&self, operation: &Task) -> Result<(), SchedulerError> {
        self.inner.graph.release(operation)?;
        tracing::debug!(owner = %self.owner_label(), task = %operation, "external operation submitted");
        Ok(())
    }

    /// `create_operation` + `submit_external_operation`.
    pub fn add_operation(&self, operation: Arc<dyn Operation>) -> Result<Task, SchedulerError> {
        let task = self.external(operation);
        self.inner.graph.insert(task.clone(), false, None, &[])?;
        tracing::debug!(owner = %self.owner_label(), task = %task, "external operation submitted");
        Ok(task)
    }

    fn external(&self, operation: Arc<dyn Operation>) -> Task {
        Task::new(
            self.inner.ids.generate_task_id(),
            None,
            None,
            operation,
            self.inner.clock.now(),
            self.inner.graph.handle(),
        )
    }

    /// `dependent` waits for `dependency`. Same acceptance rules as the
    /// edges wired by `get_or_create_task`; returns whether the edge was
    /// accepted.
    pub fn add_dependency(&self, dependent: &Task, dependency: &Task) -> bool {
        let outcome = self.inner.graph.add_edge(dependent, dependency);
        if !outcome.is_accepted() {
            tracing::warn!(owner = %self.owner_label(), task = %dependent, dependency = %dependency, ?outcome, "dependency edge rejected");
        }
        outcome.is_accepted()
    }

    /// Cancel `task` and everything that transitively depends on it.
    pub fn cancel(&self, task: &Task) {
        self.inner.graph.cancel(task);
    }

    /// Stop tasks from starting. Executing tasks are unaffected.
    pub fn suspend_all(&self) {
        self.inner.graph.suspend();
    }

    /// Suspend, then wait until nothing is executing.
    ///
    /// No built-in timeout: wrap in `tokio::time::timeout` if operations
    /// may not finish.
    pub async fn suspend_all_and_wait_for_executing(&self) {
        self.inner.graph.suspend();
        self.inner.graph.wait_for_executing().await;
        tracing::info!(owner = %self.owner_label(), "graph drained");
    }

    /// Blocking variant of `suspend_all_and_wait_for_executing`.
    ///
    /// Blocks the calling OS thread. Do not call it from an async context
    /// (use `spawn_blocking` or a plain thread).
    pub fn suspend_all_and_wait_for_executing_blocking(&self) {
        self.inner.graph.suspend();
        self.inner.graph.wait_for_executing_blocking();
        tracing::info!(owner = %self.owner_label(), "graph drained");
    }

    pub fn resume_all(&self) {
        self.inner.graph.resume();
    }

    /// Informational only; may be stale by the time it is read.
    pub fn is_suspended(&self) -> bool {
        self.inner.graph.is_suspended()
    }

    /// Host foreground-priority input for the background gate.
    pub fn set_foreground(&self, foreground: bool) {
        self.inner.graph.update_host(|host| host.foreground = foreground);
    }

    pub fn is_foreground(&self) -> bool {
        self.inner.graph.host().foreground
    }

    /// When false, no network-bound task starts while the host is in the
    /// background, whatever the background policy says.
    pub fn set_execute_tasks_in_background_enabled(&self, enabled: bool) {
        self.inner
            .graph
            .update_host(|host| host.background_enabled = enabled);
    }

    pub fn execute_tasks_in_background_enabled(&self) -> bool {
        self.inner.graph.host().background_enabled
    }

    /// Snapshots of the registered (descriptor) tasks.
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.inner
            .graph
            .registered_tasks()
            .iter()
            .map(Task::snapshot)
            .collect()
    }

    /// Visit the registered tasks. Runs on a snapshot, outside the lock.
    pub fn for_each_task(&self, mut f: impl FnMut(&Task)) {
        for task in self.inner.graph.registered_tasks() {
            f(&task);
        }
    }

    pub fn counts(&self) -> GraphCounts {
        self.inner.graph.counts()
    }

    pub fn executing_count(&self) -> usize {
        self.inner.graph.executing()
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    pub fn registered_kinds(&self) -> Vec<String> {
        self.inner
            .runtime
            .registry()
            .registered_kinds()
            .into_iter()
            .collect()
    }

    /// Label of the owner, or `<detached>` once it is gone.
    pub fn owner_label(&self) -> String {
        self.inner
            .owner
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|owner| owner.label())
            .unwrap_or_else(|| "<detached>".to_string())
    }

    /// Cancel everything not yet finished, stop the workers and wait for them.
    pub async fn shutdown(&self) {
        self.inner.graph.close();
        let workers = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(workers) = workers {
            workers.shutdown_and_join().await;
        }
        tracing::info!(owner = %self.owner_label(), "scheduler shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskError, TaskStatus};
    use crate::testkit::{Behaviour, Recorder, d, wait_until, with_timeout};
    use std::collections::HashSet;
    use std::time::Duration;

    struct Repo;

    impl Owner for Repo {
        fn label(&self) -> String {
            "repo:assets".to_string()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_share_one_task() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(4);

        let mut joins = Vec::new();
        for _ in 0..16 {
            let scheduler = scheduler.clone();
            joins.push(tokio::task::spawn_blocking(move || {
                scheduler.queue_task(d("gated:fonts")).unwrap()
            }));
        }
        let mut tasks = Vec::new();
        for join in joins {
            tasks.push(join.await.unwrap());
        }
        let ids: HashSet<_> = tasks.iter().map(Task::id).collect();
        assert_eq!(ids.len(), 1);

        wait_until(|| recorder.has_started("gated:fonts")).await;
        recorder.release("gated:fonts");
        with_timeout(tasks[0].wait()).await.unwrap();

        assert_eq!(recorder.runs("gated:fonts"), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dependent_never_starts_before_dependency_succeeds() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(4);

        let fetch = scheduler.queue_task(d("gated:fonts")).unwrap();
        let verify = scheduler
            .get_or_create_task(TaskRequest::new(d("instant:fonts")).depends_on(&fetch))
            .unwrap();

        wait_until(|| recorder.has_started("gated:fonts")).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(verify.status(), TaskStatus::Pending);
        assert!(!recorder.has_started("instant:fonts"));

        recorder.release("gated:fonts");
        with_timeout(verify.wait()).await.unwrap();

        assert_eq!(recorder.started(), vec!["gated:fonts", "instant:fonts"]);
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_cascades_to_dependents_only() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(2);
        scheduler.suspend_all();

        let fetch = scheduler.queue_task(d("instant:a")).unwrap();
        let verify = scheduler
            .get_or_create_task(TaskRequest::new(d("instant:verify-a")).depends_on(&fetch))
            .unwrap();
        let install = scheduler
            .get_or_create_task(TaskRequest::new(d("instant:install-a")).depends_on(&verify))
            .unwrap();
        let unrelated = scheduler.queue_task(d("instant:b")).unwrap();

        fetch.cancel();

        assert_eq!(fetch.status(), TaskStatus::Cancelled);
        assert_eq!(verify.status(), TaskStatus::Cancelled);
        assert_eq!(install.status(), TaskStatus::Cancelled);
        assert_eq!(unrelated.status(), TaskStatus::Suspended);

        scheduler.resume_all();
        with_timeout(unrelated.wait()).await.unwrap();
        assert_eq!(recorder.started(), vec!["instant:b"]);
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelling_an_executing_task_settles_it_cancelled() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(2);

        let fetch = scheduler.queue_task(d("gated:a")).unwrap();
        let install = scheduler
            .get_or_create_task(TaskRequest::new(d("instant:a")).depends_on(&fetch))
            .unwrap();
        wait_until(|| recorder.has_started("gated:a")).await;

        scheduler.cancel(&fetch);

        assert_eq!(with_timeout(fetch.wait()).await, Err(TaskError::Cancelled));
        assert!(matches!(
            with_timeout(install.wait()).await,
            Err(TaskError::DependencyFailed { dependency }) if dependency == fetch.id()
        ));
        assert_eq!(scheduler.executing_count(), 0);
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn suspend_blocks_new_starts_but_not_running_tasks() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(4);

        let running = scheduler.queue_task(d("gated:running")).unwrap();
        wait_until(|| recorder.has_started("gated:running")).await;

        scheduler.suspend_all();
        assert!(scheduler.is_suspended());
        let queued = scheduler.queue_task(d("instant:queued")).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(queued.status(), TaskStatus::Suspended);
        assert_eq!(running.status(), TaskStatus::Executing);

        recorder.release("gated:running");
        with_timeout(running.wait()).await.unwrap();
        assert!(!recorder.has_started("instant:queued"));

        scheduler.resume_all();
        with_timeout(queued.wait()).await.unwrap();
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drain_returns_immediately_when_idle() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(2);

        with_timeout(scheduler.suspend_all_and_wait_for_executing()).await;
        assert!(scheduler.is_suspended());

        let blocking = scheduler.clone();
        with_timeout(tokio::task::spawn_blocking(move || {
            blocking.suspend_all_and_wait_for_executing_blocking()
        }))
        .await
        .unwrap();
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drain_waits_for_executing_tasks() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(2);

        let a = scheduler.queue_task(d("gated:a")).unwrap();
        let b = scheduler.queue_task(d("gated:b")).unwrap();
        wait_until(|| recorder.has_started("gated:a") && recorder.has_started("gated:b")).await;

        let async_drain = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.suspend_all_and_wait_for_executing().await })
        };
        let blocking_drain = {
            let scheduler = scheduler.clone();
            std::thread::spawn(move || scheduler.suspend_all_and_wait_for_executing_blocking())
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!async_drain.is_finished());
        assert!(!blocking_drain.is_finished());

        // submitted during the drain: stays queued
        let late = scheduler.queue_task(d("instant:late")).unwrap();

        recorder.release("gated:a");
        with_timeout(a.wait()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!async_drain.is_finished());

        recorder.release("gated:b");
        with_timeout(b.wait()).await.unwrap();
        with_timeout(async_drain).await.unwrap();
        wait_until(|| blocking_drain.is_finished()).await;
        blocking_drain.join().unwrap();

        assert_eq!(scheduler.executing_count(), 0);
        assert_eq!(late.status(), TaskStatus::Suspended);
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn duplicate_request_while_executing_runs_once() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(4);

        let a = scheduler.queue_task(d("gated:d1")).unwrap();
        wait_until(|| recorder.has_started("gated:d1")).await;
        assert_eq!(a.status(), TaskStatus::Executing);

        let b = scheduler.queue_task(d("gated:d1")).unwrap();
        assert_eq!(a, b);

        recorder.release("gated:d1");
        with_timeout(b.wait()).await.unwrap();
        assert_eq!(recorder.runs("gated:d1"), 1);

        // terminal tasks leave the registry: the next request is a new task
        let again = scheduler.queue_task(d("gated:d1")).unwrap();
        assert_ne!(again, a);
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn parent_completes_after_child() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(4);

        let parent = scheduler
            .create_operation(recorder.operation("report", Behaviour::Instant))
            .unwrap();
        let child = scheduler
            .get_or_create_task(TaskRequest::new(d("gated:child")).with_parent(&parent))
            .unwrap();
        scheduler.submit_external_operation(&parent).unwrap();

        wait_until(|| recorder.has_started("gated:child")).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(parent.status(), TaskStatus::Pending);
        assert_eq!(parent.dependencies(), vec![child.clone()]);

        recorder.release("gated:child");
        with_timeout(parent.wait()).await.unwrap();

        assert_eq!(child.status(), TaskStatus::Completed);
        assert_eq!(recorder.started(), vec!["gated:child", "report"]);
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dedup_hit_makes_new_parent_wait_for_executing_task() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(4);

        let running = scheduler.queue_task(d("gated:shared")).unwrap();
        wait_until(|| recorder.has_started("gated:shared")).await;

        let parent = scheduler
            .create_operation(recorder.operation("report", Behaviour::Instant))
            .unwrap();
        let again = scheduler
            .get_or_create_task(TaskRequest::new(d("gated:shared")).with_parent(&parent))
            .unwrap();
        assert_eq!(again, running);
        assert_eq!(running.status(), TaskStatus::Executing);
        scheduler.submit_external_operation(&parent).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(parent.status(), TaskStatus::Pending);
        assert_eq!(parent.dependencies(), vec![running.clone()]);

        recorder.release("gated:shared");
        with_timeout(parent.wait()).await.unwrap();

        assert_eq!(running.status(), TaskStatus::Completed);
        assert_eq!(recorder.started(), vec!["gated:shared", "report"]);
        assert_eq!(recorder.runs("gated:shared"), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn background_disabled_blocks_network_tasks() {
        let recorder = Recorder::new();
        let scheduler = recorder
            .builder(2)
            .background_policy(|_: &Task| true)
            .build()
            .unwrap();
        scheduler.set_execute_tasks_in_background_enabled(false);
        scheduler.set_foreground(false);

        let download = scheduler.queue_task(d("net:fonts")).unwrap();
        let local = scheduler.queue_task(d("instant:fonts")).unwrap();

        with_timeout(local.wait()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(download.status(), TaskStatus::Ready);
        assert!(!recorder.has_started("net:fonts"));

        scheduler.set_foreground(true);
        with_timeout(download.wait()).await.unwrap();
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn background_policy_decides_when_enabled() {
        let recorder = Recorder::new();
        let scheduler = recorder
            .builder(2)
            .background_policy(|task: &Task| {
                task.descriptor()
                    .is_some_and(|descriptor| descriptor.resource() != "huge")
            })
            .build()
            .unwrap();
        scheduler.set_foreground(false);
        assert!(scheduler.execute_tasks_in_background_enabled());

        let small = scheduler.queue_task(d("net:small")).unwrap();
        let huge = scheduler.queue_task(d("net:huge")).unwrap();

        with_timeout(small.wait()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(huge.status(), TaskStatus::Ready);

        scheduler.set_foreground(true);
        with_timeout(huge.wait()).await.unwrap();
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_dependency_cancels_dependent_without_running_it() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(4);

        let y = scheduler.queue_task(d("gated:y")).unwrap();
        let z = scheduler.queue_task(d("failing:z")).unwrap();
        let x = scheduler
            .get_or_create_task(TaskRequest::new(d("instant:x")).depends_on(&y).depends_on(&z))
            .unwrap();

        assert!(matches!(
            with_timeout(x.wait()).await,
            Err(TaskError::DependencyFailed { dependency }) if dependency == z.id()
        ));
        assert_eq!(z.status(), TaskStatus::Failed);
        assert_eq!(x.status(), TaskStatus::Cancelled);

        recorder.release("gated:y");
        with_timeout(y.wait()).await.unwrap();
        assert!(!recorder.has_started("instant:x"));
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn extra_dependencies_on_duplicate_request() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(4);
        let extra = scheduler.queue_task(d("gated:extra")).unwrap();

        // Pending/Ready task: the edge is accepted and it waits again
        scheduler.suspend_all();
        let queued = scheduler.queue_task(d("instant:queued")).unwrap();
        let same = scheduler
            .get_or_create_task(TaskRequest::new(d("instant:queued")).depends_on(&extra))
            .unwrap();
        assert_eq!(same, queued);
        assert_eq!(queued.status(), TaskStatus::Pending);
        assert_eq!(queued.dependencies(), vec![extra.clone()]);
        scheduler.resume_all();

        // Executing task: the edge is rejected, task returned unchanged
        let running = scheduler.queue_task(d("gated:running")).unwrap();
        wait_until(|| recorder.has_started("gated:running")).await;
        let same = scheduler
            .get_or_create_task(TaskRequest::new(d("gated:running")).depends_on(&extra))
            .unwrap();
        assert_eq!(same, running);
        assert!(running.dependencies().is_empty());
        assert_eq!(running.status(), TaskStatus::Executing);

        recorder.release("gated:running");
        with_timeout(running.wait()).await.unwrap();
        assert!(queued.status().is_unstarted());

        recorder.release("gated:extra");
        with_timeout(queued.wait()).await.unwrap();
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn external_operations_honour_suspend() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(2);
        scheduler.suspend_all();

        let op = scheduler
            .add_operation(recorder.operation("cleanup", Behaviour::Instant))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(op.status(), TaskStatus::Suspended);
        assert!(scheduler.tasks().is_empty());

        scheduler.resume_all();
        with_timeout(op.wait()).await.unwrap();
        assert_eq!(recorder.runs("cleanup"), 1);

        scheduler.suspend_all();
        let held = scheduler
            .create_operation(recorder.operation("later", Behaviour::Instant))
            .unwrap();
        scheduler.submit_external_operation(&held).unwrap();
        assert_eq!(held.status(), TaskStatus::Suspended);
        assert!(matches!(
            scheduler.submit_external_operation(&held),
            Err(SchedulerError::UnknownOperation(_))
        ));

        // a held operation cancelled before submission stays cancelled
        let dropped = scheduler
            .create_operation(recorder.operation("dropped", Behaviour::Instant))
            .unwrap();
        scheduler.cancel(&dropped);
        scheduler.submit_external_operation(&dropped).unwrap();
        assert_eq!(dropped.status(), TaskStatus::Cancelled);

        scheduler.resume_all();
        with_timeout(held.wait()).await.unwrap();
        assert!(!recorder.has_started("dropped"));
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn add_dependency_wires_external_operations() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(2);

        let fetch = scheduler.queue_task(d("gated:bundle")).unwrap();
        let notify = scheduler
            .create_operation(recorder.operation("notify", Behaviour::Instant))
            .unwrap();
        assert!(scheduler.add_dependency(&notify, &fetch));
        assert!(!scheduler.add_dependency(&notify, &notify));
        scheduler.submit_external_operation(&notify).unwrap();

        wait_until(|| recorder.has_started("gated:bundle")).await;
        assert!(!scheduler.add_dependency(&fetch, &notify));

        recorder.release("gated:bundle");
        with_timeout(notify.wait()).await.unwrap();
        assert_eq!(recorder.started(), vec!["gated:bundle", "notify"]);
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn operation_failure_is_stored_on_the_task() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(2);

        let task = scheduler
            .queue_task_with_input(d("failing:fonts"), serde_json::json!({"mirror": 2}))
            .unwrap();

        let err = with_timeout(task.wait()).await.unwrap_err();
        assert_eq!(err, TaskError::operation("boom"));
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.input(), Some(&serde_json::json!({"mirror": 2})));
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_kind_fails_synchronously() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(1);

        let err = scheduler.queue_task(d("unpack:fonts")).unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownTaskKind(k) if k.as_str() == "unpack"));
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn snapshots_and_counts_reflect_the_graph() {
        let recorder = Recorder::new();
        let repo: Arc<dyn Owner> = Arc::new(Repo);
        let scheduler = recorder
            .builder(2)
            .owner(Arc::downgrade(&repo))
            .build()
            .unwrap();
        assert_eq!(scheduler.owner_label(), "repo:assets");

        scheduler.suspend_all();
        let fetch = scheduler.queue_task(d("instant:a")).unwrap();
        scheduler
            .queue_task_with_dependencies(d("instant:b"), None, vec![fetch.clone()])
            .unwrap();

        let counts = scheduler.counts();
        assert_eq!(counts.suspended, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.registered, 2);

        let snapshots = scheduler.tasks();
        assert_eq!(snapshots.len(), 2);
        let b = snapshots
            .iter()
            .find(|s| s.descriptor.as_ref().is_some_and(|desc| desc.resource() == "b"))
            .unwrap();
        assert_eq!(b.dependencies, vec![fetch.id()]);
        let json = serde_json::to_value(b).unwrap();
        assert_eq!(json["status"], "pending");

        let mut seen = 0;
        scheduler.for_each_task(|_| seen += 1);
        assert_eq!(seen, 2);

        drop(repo);
        assert_eq!(scheduler.owner_label(), "<detached>");
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_cancels_outstanding_work() {
        let recorder = Recorder::new();
        let scheduler = recorder.scheduler(1);

        let running = scheduler.queue_task(d("gated:a")).unwrap();
        let waiting = scheduler.queue_task(d("instant:b")).unwrap();
        wait_until(|| recorder.has_started("gated:a")).await;

        with_timeout(scheduler.shutdown()).await;

        assert_eq!(running.status(), TaskStatus::Cancelled);
        assert_eq!(waiting.status(), TaskStatus::Cancelled);
        assert!(matches!(
            scheduler.queue_task(d("instant:c")),
            Err(SchedulerError::ShutDown)
        ));
    }
}
