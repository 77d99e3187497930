mod task_manager;
mod worker;

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

pub use task_manager::{validate_source_url, TaskManager};
pub use worker::DownloadWorker;

use super::sweeper::CleanupSweeper;

/// Owns the background loops: exactly one download worker and one sweeper.
#[derive(Default)]
pub struct TaskScheduler {
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn spawn_worker(&self, worker: DownloadWorker) {
        let handle = tokio::spawn(async move {
            worker.run().await;
        });
        self.workers.lock().await.push(handle);
    }

    pub async fn spawn_sweeper(&self, sweeper: Arc<CleanupSweeper>) {
        let handle = tokio::spawn(async move {
            sweeper.run().await;
        });
        self.workers.lock().await.push(handle);
    }

    pub async fn shutdown(&self) {
        let mut workers = self.workers.lock().await;
        info!("Stopping {} background loops", workers.len());
        for handle in workers.drain(..) {
            handle.abort();
        }
    }
}
