use std::time::Duration;

use thiserror::Error;

use crate::schedule::types::TaskState;

/// Registry failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("task already exists: {0}")]
    AlreadyExists(String),

    #[error("illegal state transition for task {task_id}: {from} -> {to}")]
    IllegalTransition {
        task_id: String,
        from: TaskState,
        to: TaskState,
    },

    /// `error` must carry a non-empty message and no other state may carry one.
    #[error("error message mismatch for task {task_id} entering {state}")]
    ErrorMessageMismatch { task_id: String, state: TaskState },
}

/// External tool failures that happen before an exit code is available.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
}

/// Process handler failures, each mapped to one HTTP status by the web layer.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Task not found")]
    TaskNotFound,

    #[error("Task is not ready. Current state: {0}")]
    NotReady(TaskState),

    #[error("Source audio file not found")]
    SourceMissing,

    #[error("Invalid clip parameters: {0}")]
    InvalidParams(String),

    #[error("Audio processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Failed to generate output file")]
    OutputMissing,

    #[error("Unexpected error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ToolError> for ProcessError {
    fn from(error: ToolError) -> Self {
        ProcessError::ProcessingFailed(error.to_string())
    }
}
