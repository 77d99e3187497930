pub mod queue;
pub mod scheduler;
pub mod sweeper;
pub mod types;
#[cfg(test)]
mod tests;

// 重导出主要类型
pub use types::{is_task_id, new_task_id, Task, TaskState};

pub use queue::{download_queue, DownloadQueue, QueueReceiver};

pub use scheduler::{validate_source_url, DownloadWorker, TaskManager, TaskScheduler};
pub use sweeper::{CleanupSweeper, StorageUsage, SweepStats};
