//! Bundle operations: fetch (network) -> verify -> install.
//!
//! Each operation reads its `BundleEntry` from the task input and the
//! previous step's output from its dependency.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use tessera_core::ports::{HttpRequest, NetworkSession, Operation, OperationContext};
use tessera_core::{TaskError, TaskOutput};

use crate::manifest::BundleEntry;

pub const FETCH: &str = "fetch";
pub const VERIFY: &str = "verify";
pub const INSTALL: &str = "install";

fn bundle_input(ctx: &OperationContext) -> Result<BundleEntry, TaskError> {
    let input = ctx
        .input()
        .cloned()
        .ok_or_else(|| TaskError::operation("missing bundle input"))?;
    Ok(serde_json::from_value(input)?)
}

/// `path` field of the named dependency's output.
fn upstream_path(ctx: &OperationContext, kind: &str) -> Result<PathBuf, TaskError> {
    ctx.dependency_output(kind)
        .and_then(|out| out.get("path").and_then(|p| p.as_str()).map(PathBuf::from))
        .ok_or_else(|| TaskError::operation(format!("no {kind} output to work from")))
}

/// Download the bundle into the staging directory.
pub struct FetchBundle {
    session: Arc<dyn NetworkSession>,
    staging: PathBuf,
}

impl FetchBundle {
    pub fn new(session: Arc<dyn NetworkSession>, staging: impl Into<PathBuf>) -> Self {
        Self {
            session,
            staging: staging.into(),
        }
    }
}

#[async_trait]
impl Operation for FetchBundle {
    fn name(&self) -> &str {
        FETCH
    }

    fn is_network_bound(&self) -> bool {
        true
    }

    async fn run(&self, ctx: OperationContext) -> Result<TaskOutput, TaskError> {
        let entry = bundle_input(&ctx)?;
        let response = self
            .session
            .send(HttpRequest::get(&entry.url), &ctx.cancellation())
            .await?
            .error_for_status()?;

        tokio::fs::create_dir_all(&self.staging).await?;
        let path = self.staging.join(format!("{}.part", entry.file_name()));
        tokio::fs::write(&path, &response.body).await?;

        tracing::debug!(bundle = %entry.name, bytes = response.body.len(), path = %path.display(), "bundle staged");
        Ok(json!({ "path": path.to_string_lossy(), "bytes": response.body.len() }))
    }
}

/// Check the staged file against the manifest digest.
pub struct VerifyBundle;

#[async_trait]
impl Operation for VerifyBundle {
    fn name(&self) -> &str {
        VERIFY
    }

    async fn run(&self, ctx: OperationContext) -> Result<TaskOutput, TaskError> {
        let entry = bundle_input(&ctx)?;
        let path = upstream_path(&ctx, FETCH)?;
        let actual = sha256_file(&path).await?;

        if !actual.eq_ignore_ascii_case(&entry.sha256) {
            return Err(TaskError::operation(format!(
                "sha256 mismatch for {}: expected {}, got {}",
                entry.name, entry.sha256, actual
            )));
        }
        Ok(json!({ "path": path.to_string_lossy(), "sha256": actual }))
    }
}

async fn sha256_file(path: &Path) -> Result<String, TaskError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Move the verified file into the output directory.
pub struct InstallBundle {
    out: PathBuf,
}

impl InstallBundle {
    pub fn new(out: impl Into<PathBuf>) -> Self {
        Self { out: out.into() }
    }
}

#[async_trait]
impl Operation for InstallBundle {
    fn name(&self) -> &str {
        INSTALL
    }

    async fn run(&self, ctx: OperationContext) -> Result<TaskOutput, TaskError> {
        let entry = bundle_input(&ctx)?;
        let staged = upstream_path(&ctx, VERIFY)?;
        if ctx.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        tokio::fs::create_dir_all(&self.out).await?;
        let target = self.out.join(entry.file_name());
        tokio::fs::rename(&staged, &target).await?;

        tracing::info!(bundle = %entry.name, version = entry.version, path = %target.display(), "bundle installed");
        Ok(json!({ "bundle": entry.name, "version": entry.version, "path": target.to_string_lossy() }))
    }
}

/// Parent of every install; finishes once all of them have.
pub struct SyncReport;

#[async_trait]
impl Operation for SyncReport {
    fn name(&self) -> &str {
        "sync-report"
    }

    async fn run(&self, ctx: OperationContext) -> Result<TaskOutput, TaskError> {
        let installed: Vec<TaskOutput> = ctx
            .dependencies()
            .iter()
            .filter_map(|dep| dep.output())
            .collect();
        Ok(json!({ "installed": installed }))
    }
}
