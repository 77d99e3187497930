use std::io::ErrorKind;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::audio::task_dir;
use crate::config::Config;
use crate::storage::task::{ArtifactLeases, TaskStorage};
use crate::utils::fs::{dir_size, list_task_dirs, TaskDir};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub directories_removed: usize,
    pub tasks_removed: usize,
    pub failures: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StorageUsage {
    pub directories: usize,
    pub bytes: u64,
}

/// Reclaims aged artifact directories and prunes registry entries that no
/// longer have one.
pub struct CleanupSweeper {
    storage: Arc<dyn TaskStorage>,
    leases: Arc<ArtifactLeases>,
    scratch_dir: PathBuf,
    retention: Duration,
    interval: Duration,
    retry_interval: Duration,
}

impl CleanupSweeper {
    pub fn new(storage: Arc<dyn TaskStorage>, leases: Arc<ArtifactLeases>, config: &Config) -> Self {
        Self {
            storage,
            leases,
            scratch_dir: config.scratch_dir.clone(),
            retention: config.retention,
            interval: config.sweep_interval,
            retry_interval: config.sweep_retry_interval,
        }
    }

    /// Sweeps forever. A failed or panicking pass is logged and retried after
    /// the shorter retry interval.
    pub async fn run(self: Arc<Self>) {
        info!(
            "Cleanup sweeper started (interval {}s, retention {}s)",
            self.interval.as_secs(),
            self.retention.as_secs()
        );
        loop {
            let pause = match AssertUnwindSafe(self.sweep()).catch_unwind().await {
                Ok(Ok(_)) => self.interval,
                Ok(Err(e)) => {
                    error!("Error in cleanup sweep: {:#}", e);
                    self.retry_interval
                }
                Err(_) => {
                    error!("Cleanup sweep panicked");
                    self.retry_interval
                }
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// One retention and reconciliation pass. Shared by the periodic loop and
    /// the manual cleanup endpoint.
    pub async fn sweep(&self) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        for dir in list_task_dirs(&self.scratch_dir).await? {
            self.reclaim_if_expired(&dir, &mut stats).await;
        }

        // entries whose directory was removed earlier or by someone else
        for task in self.storage.all().await {
            if !task.state.is_terminal() {
                continue;
            }
            let dir = task_dir(&self.scratch_dir, &task.id);
            if tokio::fs::try_exists(&dir).await.unwrap_or(true) {
                continue;
            }
            if self.storage.remove(&task.id).await.is_some() {
                debug!("Pruned task {} without artifact directory", task.id);
                stats.tasks_removed += 1;
            }
        }

        if stats.directories_removed > 0 || stats.tasks_removed > 0 || stats.failures > 0 {
            info!(
                "Cleanup completed: {} directories, {} tasks removed, {} failures",
                stats.directories_removed, stats.tasks_removed, stats.failures
            );
        }
        Ok(stats)
    }

    async fn reclaim_if_expired(&self, dir: &TaskDir, stats: &mut SweepStats) {
        if !self.is_expired(&dir.task_id, dir.modified).await {
            return;
        }

        let Some(_guard) = self.leases.begin_reclaim(&dir.task_id) else {
            debug!("Task directory {} is in use, skipping", dir.task_id);
            return;
        };

        // a processing request may have touched the task before the guard was taken
        let modified = match tokio::fs::metadata(&dir.path).await.and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(_) => dir.modified,
        };
        if !self.is_expired(&dir.task_id, modified).await {
            debug!("Task directory {} was used during the sweep, keeping it", dir.task_id);
            return;
        }

        info!("Cleaning up old task directory: {}", dir.task_id);
        match tokio::fs::remove_dir_all(&dir.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to clean up directory {}: {}", dir.path.display(), e);
                stats.failures += 1;
                return;
            }
        }
        stats.directories_removed += 1;

        if self.storage.remove(&dir.task_id).await.is_some() {
            stats.tasks_removed += 1;
        }
    }

    /// Age runs from the later of the directory mtime and the task's
    /// `updated_at`. Tasks that are still queued or downloading never expire.
    async fn is_expired(&self, task_id: &str, modified: SystemTime) -> bool {
        let task = self.storage.get(task_id).await;
        if task.as_ref().is_some_and(|task| !task.state.is_terminal()) {
            return false;
        }

        let last_activity = match &task {
            Some(task) => modified.max(SystemTime::from(task.updated_at)),
            None => modified,
        };
        let age = SystemTime::now().duration_since(last_activity).unwrap_or_default();
        age > self.retention
    }

    /// Number and total size of the artifact directories on disk.
    pub async fn storage_usage(&self) -> Result<StorageUsage> {
        let dirs = list_task_dirs(&self.scratch_dir).await?;
        let mut usage = StorageUsage {
            directories: dirs.len(),
            bytes: 0,
        };
        for dir in &dirs {
            usage.bytes += dir_size(&dir.path).await?;
        }
        Ok(usage)
    }
}
