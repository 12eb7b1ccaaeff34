use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::graph::WorkQueue;
use crate::runtime::Runtime;

/// Worker group handle.
/// - ワーカー数 = 同時に Executing になれるタスクの上限
/// - `request_shutdown()` で新しい lease の取得を止める
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers. Must be called inside a tokio runtime.
    pub fn spawn(n: usize, queue: Arc<dyn WorkQueue>, runtime: Arc<Runtime>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let rt = Arc::clone(&runtime);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, q, rt, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// In-flight operations are not interrupted by this; cancel the tasks
    /// (or close the graph) for that.
    pub fn request_shutdown(&self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn WorkQueue>,
    runtime: Arc<Runtime>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    tracing::debug!(worker_id, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // lease は「待つ」可能性があるので select で shutdown と競合させる
        let lease = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // sender dropped: the group is gone
                    break;
                }
                continue;
            }
            lease = queue.lease() => lease,
        };

        // None = graph closed
        let Some(lease) = lease else {
            break;
        };

        // graph のロックは lease() の中で完結している（ロック跨ぎ await しない）
        let result = runtime.execute(lease.task()).await;
        match &result {
            Ok(_) => tracing::debug!(worker_id, task = %lease.task(), "operation finished"),
            Err(e) => tracing::info!(worker_id, task = %lease.task(), error = %e, "operation did not succeed"),
        }
        lease.complete(result);
    }
    tracing::debug!(worker_id, "worker stopped");
}
