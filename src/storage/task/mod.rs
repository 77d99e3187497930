use async_trait::async_trait;

use crate::error::StorageError;
use crate::schedule::types::{Task, TaskState};

pub mod lease;
pub mod memory;

pub use lease::{ArtifactLease, ArtifactLeases, ReclaimGuard};
pub use memory::InMemoryTaskStorage;

/// The task registry shared by the API layer, the download worker and the
/// cleanup sweeper. Every call is atomic with respect to a single task id.
#[async_trait]
pub trait TaskStorage: Send + Sync + 'static {
    /// Registers a new `queued` task.
    async fn create(&self, task_id: &str, source_url: &str) -> Result<Task, StorageError>;
    async fn get(&self, task_id: &str) -> Option<Task>;
    /// Moves a task along the state machine and returns the updated record.
    async fn set_state(
        &self,
        task_id: &str,
        state: TaskState,
        error_message: Option<String>,
    ) -> Result<Task, StorageError>;
    /// Refreshes `updated_at` without changing state.
    async fn touch(&self, task_id: &str) -> Result<(), StorageError>;
    async fn remove(&self, task_id: &str) -> Option<Task>;
    async fn size(&self) -> usize;
    async fn all(&self) -> Vec<Task>;
}
