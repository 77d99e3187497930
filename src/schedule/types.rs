use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of a hyphenated UUID, e.g. `67e55044-10b1-426f-9247-bb680e5fe0c8`.
const TASK_ID_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Downloading,
    Ready,
    Error,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Ready | TaskState::Error)
    }

    /// Legal moves are `queued -> downloading -> {ready | error}` only.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Queued, TaskState::Downloading)
                | (TaskState::Downloading, TaskState::Ready)
                | (TaskState::Downloading, TaskState::Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Downloading => "downloading",
            TaskState::Ready => "ready",
            TaskState::Error => "error",
        }
    }
}

impl Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub source_url: String,
    pub state: TaskState,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last state change or processing request; drives retention.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: String, source_url: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_url,
            state: TaskState::Queued,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn new_task_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

/// Task ids double as directory names, so anything that is not a
/// hyphenated UUID is rejected before it reaches the filesystem.
pub fn is_task_id(candidate: &str) -> bool {
    candidate.len() == TASK_ID_LEN && Uuid::try_parse(candidate).is_ok()
}
