use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::File;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{filter_chain, primary_artifact, task_dir, transcode_command, AudioFormat, ClipParams};
use crate::config::Config;
use crate::error::ProcessError;
use crate::schedule::types::{is_task_id, Task, TaskState};
use crate::storage::task::{ArtifactLeases, TaskStorage};
use crate::tools::ToolRunner;

/// An opened artifact ready to be streamed back to a client.
#[derive(Debug)]
pub struct ArtifactFile {
    pub file: File,
    pub path: PathBuf,
    pub filename: String,
    pub format: AudioFormat,
    pub len: u64,
}

/// Turns a ready task's download into edited clips.
///
/// Stateless per call: the task's lifecycle state is read, never written.
pub struct ClipProcessor {
    storage: Arc<dyn TaskStorage>,
    runner: Arc<dyn ToolRunner>,
    leases: Arc<ArtifactLeases>,
    config: Arc<Config>,
}

impl ClipProcessor {
    pub fn new(
        storage: Arc<dyn TaskStorage>,
        runner: Arc<dyn ToolRunner>,
        leases: Arc<ArtifactLeases>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            storage,
            runner,
            leases,
            config,
        }
    }

    /// Trims and filters the primary artifact into a fresh Ogg file.
    pub async fn process(&self, task_id: &str, params: &ClipParams) -> Result<ArtifactFile, ProcessError> {
        self.ready_task(task_id).await?;
        params.validate().map_err(ProcessError::InvalidParams)?;

        // held until the output is open so the sweeper cannot reclaim mid-run
        let _lease = self.leases.acquire(task_id).ok_or(ProcessError::SourceMissing)?;
        self.storage
            .touch(task_id)
            .await
            .map_err(|_| ProcessError::TaskNotFound)?;

        let source = primary_artifact(&self.config.scratch_dir, task_id);
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            warn!("Source audio for task {} is gone", task_id);
            return Err(ProcessError::SourceMissing);
        }

        let output_id = Uuid::new_v4();
        let format = AudioFormat::Ogg;
        let output = task_dir(&self.config.scratch_dir, task_id)
            .join(format!("{}.{}", output_id, format.extension()));
        let filters = filter_chain(params);
        let command = transcode_command(&self.config.transcode_tool, &source, &filters, &output);

        info!("Processing audio for task {} with filters: {}", task_id, filters);
        let result = self.runner.run(&command).await?;
        if !result.success() {
            let diagnostic = result.diagnostic("transcoder exited with an error");
            error!("Transcode failed for task {}: {}", task_id, diagnostic);
            return Err(ProcessError::ProcessingFailed(diagnostic));
        }

        let filename = format!("clip_{}.{}", output_id, format.extension());
        open_artifact(output, filename, format)
            .await?
            .ok_or(ProcessError::OutputMissing)
    }

    /// Opens the downloaded source of a ready task.
    pub async fn open_source(&self, task_id: &str) -> Result<ArtifactFile, ProcessError> {
        self.ready_task(task_id).await?;

        let _lease = self.leases.acquire(task_id).ok_or(ProcessError::SourceMissing)?;
        let format = AudioFormat::M4a;
        let filename = format!("audio_{}.{}", task_id, format.extension());
        open_artifact(primary_artifact(&self.config.scratch_dir, task_id), filename, format)
            .await?
            .ok_or(ProcessError::SourceMissing)
    }

    async fn ready_task(&self, task_id: &str) -> Result<Task, ProcessError> {
        if !is_task_id(task_id) {
            return Err(ProcessError::TaskNotFound);
        }
        let task = self
            .storage
            .get(task_id)
            .await
            .ok_or(ProcessError::TaskNotFound)?;
        if task.state != TaskState::Ready {
            return Err(ProcessError::NotReady(task.state));
        }
        Ok(task)
    }
}

/// `Ok(None)` when the file does not exist.
async fn open_artifact(
    path: PathBuf,
    filename: String,
    format: AudioFormat,
) -> Result<Option<ArtifactFile>, ProcessError> {
    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata().await?.len();
    Ok(Some(ArtifactFile {
        file,
        path,
        filename,
        format,
        len,
    }))
}
