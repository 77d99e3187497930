use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::audio::{download_command, task_dir, PRIMARY_ARTIFACT};
use crate::config::Config;
use crate::schedule::queue::QueueReceiver;
use crate::schedule::types::{Task, TaskState};
use crate::storage::task::TaskStorage;
use crate::tools::ToolRunner;

/// The single consumer of the download queue.
///
/// Tasks are downloaded one at a time in submission order. A failure of any
/// kind ends that task in `error`; the loop itself keeps going.
pub struct DownloadWorker {
    // task registry, shared with the api and the sweeper
    storage: Arc<dyn TaskStorage>,
    runner: Arc<dyn ToolRunner>,
    config: Arc<Config>,
    queue: QueueReceiver,
}

impl DownloadWorker {
    pub fn new(
        storage: Arc<dyn TaskStorage>,
        runner: Arc<dyn ToolRunner>,
        config: Arc<Config>,
        queue: QueueReceiver,
    ) -> Self {
        Self {
            storage,
            runner,
            config,
            queue,
        }
    }

    pub async fn run(mut self) {
        info!("Download worker started");
        while let Some(task_id) = self.queue.recv().await {
            match AssertUnwindSafe(self.process_task(&task_id)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Error processing task {}: {:#}", task_id, e);
                    self.fail_in_flight(&task_id, &e.to_string()).await;
                }
                Err(_) => {
                    error!("Download of task {} panicked", task_id);
                    self.fail_in_flight(&task_id, "internal error while downloading").await;
                }
            }
        }
        warn!("Download queue closed, worker exiting");
    }

    async fn process_task(&self, task_id: &str) -> anyhow::Result<()> {
        let Some(task) = self.storage.get(task_id).await else {
            warn!("Task {} not found in registry, skipping", task_id);
            return Ok(());
        };
        if task.state != TaskState::Queued {
            warn!("Task {} is already {}, skipping", task_id, task.state);
            return Ok(());
        }

        self.storage.set_state(task_id, TaskState::Downloading, None).await?;
        info!("Starting download for task {}: {}", task_id, task.source_url);

        match self.download(&task).await {
            Ok(()) => {
                self.storage.set_state(task_id, TaskState::Ready, None).await?;
                info!("Download completed for task {}", task_id);
            }
            Err(message) => {
                error!("Download failed for task {}: {}", task_id, message);
                self.storage
                    .set_state(task_id, TaskState::Error, Some(message))
                    .await?;
            }
        }
        Ok(())
    }

    /// `Err` carries the diagnostic recorded on the task.
    async fn download(&self, task: &Task) -> Result<(), String> {
        let dir = task_dir(&self.config.scratch_dir, &task.id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| format!("Failed to create task directory: {}", e))?;

        let command = download_command(&self.config.download_tool, &task.source_url, &dir);
        let output = self.runner.run(&command).await.map_err(|e| e.to_string())?;
        if !output.success() {
            return Err(output.diagnostic("Download failed"));
        }

        match tokio::fs::try_exists(dir.join(PRIMARY_ARTIFACT)).await {
            Ok(true) => Ok(()),
            _ => Err(format!("Download finished but {} was not produced", PRIMARY_ARTIFACT)),
        }
    }

    /// Marks a task that was left in `downloading` as `error`.
    async fn fail_in_flight(&self, task_id: &str, message: &str) {
        let Some(task) = self.storage.get(task_id).await else {
            return;
        };
        if task.state != TaskState::Downloading {
            return;
        }
        let message = if message.trim().is_empty() {
            "Download failed".to_string()
        } else {
            message.to_string()
        };
        if let Err(e) = self
            .storage
            .set_state(task_id, TaskState::Error, Some(message))
            .await
        {
            error!("Failed to mark task {} as error: {}", task_id, e);
        }
    }
}
