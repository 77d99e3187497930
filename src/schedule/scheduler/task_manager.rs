use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use url::Url;

use crate::schedule::queue::DownloadQueue;
use crate::schedule::types::{new_task_id, Task};
use crate::storage::task::TaskStorage;

/// Entry point for the API layer: creates tasks and reads them back.
pub struct TaskManager {
    storage: Arc<dyn TaskStorage>,
    queue: DownloadQueue,
}

impl TaskManager {
    pub fn new(storage: Arc<dyn TaskStorage>, queue: DownloadQueue) -> Self {
        Self { storage, queue }
    }

    pub fn storage(&self) -> &Arc<dyn TaskStorage> {
        &self.storage
    }

    /// Registers a `queued` task for `url` and hands its id to the worker.
    pub async fn create_task(&self, url: &Url) -> Result<Task> {
        let task_id = new_task_id();
        let task = self.storage.create(&task_id, url.as_str()).await?;

        if let Err(e) = self.queue.push(task_id.clone()) {
            // an unqueued task would sit in `queued` forever
            error!("Failed to enqueue task {}: {}", task_id, e);
            self.storage.remove(&task_id).await;
            return Err(e);
        }

        info!("Created download task {} for URL: {}", task_id, url);
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.storage.get(task_id).await
    }

    pub async fn active_tasks(&self) -> usize {
        self.storage.size().await
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }
}

/// Accepts absolute `http`/`https` URLs with a host.
pub fn validate_source_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("invalid URL: {}", e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported URL scheme: {}", url.scheme()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("URL must have a host".to_string());
    }
    Ok(url)
}
