use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::TaskStorage;
use crate::error::StorageError;
use crate::schedule::types::{Task, TaskState};

#[derive(Default)]
pub struct InMemoryTaskStorage {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStorage for InMemoryTaskStorage {
    async fn create(&self, task_id: &str, source_url: &str) -> Result<Task, StorageError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(task_id) {
            return Err(StorageError::AlreadyExists(task_id.to_string()));
        }

        let task = Task::new(task_id.to_string(), source_url.to_string());
        tasks.insert(task_id.to_string(), task.clone());
        Ok(task)
    }

    async fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.get(task_id).cloned()
    }

    async fn set_state(
        &self,
        task_id: &str,
        state: TaskState,
        error_message: Option<String>,
    ) -> Result<Task, StorageError> {
        let has_message = error_message
            .as_deref()
            .is_some_and(|message| !message.trim().is_empty());
        if has_message != (state == TaskState::Error) {
            return Err(StorageError::ErrorMessageMismatch {
                task_id: task_id.to_string(),
                state,
            });
        }

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(task_id.to_string()))?;

        if !task.state.can_transition_to(state) {
            return Err(StorageError::IllegalTransition {
                task_id: task_id.to_string(),
                from: task.state,
                to: state,
            });
        }

        debug!("Task {} {} -> {}", task_id, task.state, state);
        task.state = state;
        task.error_message = error_message;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn touch(&self, task_id: &str) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(task_id.to_string()))?;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn remove(&self, task_id: &str) -> Option<Task> {
        self.tasks.write().await.remove(task_id)
    }

    async fn size(&self) -> usize {
        self.tasks.read().await.len()
    }

    async fn all(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }
}
