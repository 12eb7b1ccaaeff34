//! `tessera sync`: turn the manifest into a task graph and run it.
//!
//! Per bundle: `fetch:<name>@<v>` -> `verify:<name>@<v>` -> `install:<name>@<v>`,
//! and `install` also waits for the installs of its `depends_on` bundles.
//! A held `sync-report` operation is the parent of every install and is
//! submitted once the whole graph is wired.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tessera_core::domain::TaskSnapshot;
use tessera_core::ports::{NetworkSession, Operation, Owner};
use tessera_core::{
    SchedulerBuilder, SchedulerConfig, Task, TaskDescriptor, TaskOutput, TaskRequest, TaskScheduler,
};

use crate::cli::SyncArgs;
use crate::manifest::Manifest;
use crate::ops::{FETCH, FetchBundle, INSTALL, InstallBundle, SyncReport, VERIFY, VerifyBundle};

/// The output directory a sync works on; owns the scheduler.
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging(&self) -> PathBuf {
        self.root.join(".staging")
    }
}

impl Owner for Repository {
    fn label(&self) -> String {
        format!("repo:{}", self.root.display())
    }
}

#[derive(Debug, Serialize)]
pub struct SyncSummary {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TaskOutput>,
    pub tasks: Vec<TaskSnapshot>,
}

struct Plan {
    report: Task,
    tasks: Vec<Task>,
}

pub async fn run_sync(args: &SyncArgs, session: Arc<dyn NetworkSession>) -> Result<SyncSummary> {
    let manifest = Manifest::load(&args.manifest)?;

    let mut config = match &args.config {
        Some(path) => SchedulerConfig::load(path)?,
        None => SchedulerConfig::default(),
    };
    if let Some(n) = args.max_concurrency {
        config.max_concurrency = n;
    }
    if args.background {
        config.foreground = false;
    }

    let repo = Arc::new(Repository::new(&args.out));
    let scheduler = build_scheduler(config, session, &repo)?;
    let plan = plan(&scheduler, &manifest)?;

    // the report can settle before unrelated bundles finish
    let settled = async {
        let result = plan.report.wait().await;
        for task in &plan.tasks {
            let _ = task.wait().await;
        }
        result
    };
    let result = tokio::select! {
        result = settled => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(owner = %repo.label(), "interrupted, draining executing tasks");
            scheduler.suspend_all_and_wait_for_executing().await;
            scheduler.shutdown().await;
            plan.report.wait().await
        }
    };

    let summary = SyncSummary {
        ok: result.is_ok(),
        error: result.as_ref().err().map(ToString::to_string),
        report: result.ok(),
        tasks: plan.tasks.iter().map(Task::snapshot).collect(),
    };
    scheduler.shutdown().await;
    Ok(summary)
}

fn build_scheduler(
    config: SchedulerConfig,
    session: Arc<dyn NetworkSession>,
    repo: &Arc<Repository>,
) -> Result<TaskScheduler> {
    let staging = repo.staging();
    let out = repo.root().to_path_buf();
    let owner: Arc<dyn Owner> = repo.clone();

    let scheduler = SchedulerBuilder::new()
        .config(config)
        .register(
            FETCH,
            move |_: &TaskDescriptor, _: Option<&serde_json::Value>| -> Arc<dyn Operation> {
                Arc::new(FetchBundle::new(Arc::clone(&session), staging.clone()))
            },
        )?
        .register(
            VERIFY,
            |_: &TaskDescriptor, _: Option<&serde_json::Value>| -> Arc<dyn Operation> {
                Arc::new(VerifyBundle)
            },
        )?
        .register(
            INSTALL,
            move |_: &TaskDescriptor, _: Option<&serde_json::Value>| -> Arc<dyn Operation> {
                Arc::new(InstallBundle::new(out.clone()))
            },
        )?
        .expect_kinds(&[FETCH, VERIFY, INSTALL])
        .owner(Arc::downgrade(&owner))
        .build()?;
    Ok(scheduler)
}

fn plan(scheduler: &TaskScheduler, manifest: &Manifest) -> Result<Plan> {
    let report = scheduler.create_operation(Arc::new(SyncReport))?;
    let mut installs: HashMap<&str, Task> = HashMap::new();
    let mut tasks = Vec::new();

    for entry in manifest.install_order()? {
        let input = serde_json::to_value(entry)?;

        let fetch = scheduler.queue_task_with_input(entry.descriptor(FETCH)?, input.clone())?;
        let verify = scheduler.get_or_create_task(
            TaskRequest::new(entry.descriptor(VERIFY)?)
                .with_input(input.clone())
                .depends_on(&fetch),
        )?;
        let upstream = entry
            .depends_on
            .iter()
            .filter_map(|name| installs.get(name.as_str()).cloned());
        let install = scheduler.get_or_create_task(
            TaskRequest::new(entry.descriptor(INSTALL)?)
                .with_input(input)
                .depends_on(&verify)
                .with_dependencies(upstream)
                .with_parent(&report),
        )?;

        installs.insert(entry.name.as_str(), install.clone());
        tasks.extend([fetch, verify, install]);
    }

    scheduler.submit_external_operation(&report)?;
    tracing::info!(
        owner = %scheduler.owner_label(),
        bundles = manifest.bundles.len(),
        tasks = tasks.len(),
        "sync planned"
    );
    tasks.push(report.clone());
    Ok(Plan { report, tasks })
}
