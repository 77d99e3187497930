pub mod audio;
pub mod config;
pub mod error;
pub mod schedule;
pub mod storage;
pub mod tools;
pub mod utils;
pub mod web;

use std::sync::Arc;

use once_cell::sync::Lazy;

use audio::clip::ClipProcessor;
use config::Config;
use schedule::{download_queue, CleanupSweeper, DownloadWorker, TaskManager};
use storage::task::{ArtifactLeases, InMemoryTaskStorage, TaskStorage};
use tools::ToolRunner;

pub struct AppContext {
    pub config: Arc<Config>,
    pub task_manager: Arc<TaskManager>,
    pub clip_processor: Arc<ClipProcessor>,
    pub sweeper: Arc<CleanupSweeper>,
}

impl AppContext {
    /// Wires the registry, queue, processor and sweeper together.
    ///
    /// The download worker owns the consuming end of the queue, so it is
    /// handed back separately for the caller to spawn.
    pub fn build(config: Config, runner: Arc<dyn ToolRunner>) -> (Arc<Self>, DownloadWorker) {
        let config = Arc::new(config);
        let storage: Arc<dyn TaskStorage> = Arc::new(InMemoryTaskStorage::new());
        let leases = Arc::new(ArtifactLeases::new());
        let (queue, receiver) = download_queue();

        let task_manager = Arc::new(TaskManager::new(storage.clone(), queue));
        let worker = DownloadWorker::new(storage.clone(), runner.clone(), config.clone(), receiver);
        let clip_processor = Arc::new(ClipProcessor::new(
            storage.clone(),
            runner,
            leases.clone(),
            config.clone(),
        ));
        let sweeper = Arc::new(CleanupSweeper::new(storage, leases, &config));

        let ctx = Arc::new(Self {
            config,
            task_manager,
            clip_processor,
            sweeper,
        });
        (ctx, worker)
    }
}

const CLIP_SCRATCH_PATH: &str = "./clip_data/tasks";
const CLIP_LOG_PATH: &str = "./logs";

pub static SCRATCH_PATH: Lazy<String> =
    Lazy::new(|| config::var("CLIP_SCRATCH_DIR").unwrap_or_else(|| CLIP_SCRATCH_PATH.to_string()));

pub static LOG_PATH: Lazy<String> =
    Lazy::new(|| config::var("CLIP_LOG_DIR").unwrap_or_else(|| CLIP_LOG_PATH.to_string()));

pub fn init_env() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // 确保数据目录存在
    std::fs::create_dir_all(SCRATCH_PATH.as_str())?;
    std::fs::create_dir_all(LOG_PATH.as_str())?;
    Ok(())
}
