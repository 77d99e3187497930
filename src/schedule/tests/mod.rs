use super::*;
use crate::audio::{primary_artifact, task_dir, ClipParams};
use crate::config::Config;
use crate::error::{ProcessError, ToolError};
use crate::tools::fake::{exit, FakeRunner};
use crate::tools::ToolCommand;
use crate::AppContext;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

struct TestEnv {
    scratch: TempDir,
    ctx: Arc<AppContext>,
    runner: Arc<FakeRunner>,
    worker: Option<DownloadWorker>,
}

impl TestEnv {
    fn new(runner: FakeRunner) -> Self {
        Self::with_config(runner, |_| {})
    }

    fn with_config(runner: FakeRunner, tweak: impl FnOnce(&mut Config)) -> Self {
        let scratch = TempDir::new().unwrap();
        let mut config = Config::with_scratch_dir(scratch.path());
        tweak(&mut config);
        let runner = Arc::new(runner);
        let (ctx, worker) = AppContext::build(config, runner.clone());
        Self {
            scratch,
            ctx,
            runner,
            worker: Some(worker),
        }
    }

    fn start_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            tokio::spawn(worker.run());
        }
    }

    async fn submit(&self, url: &str) -> String {
        let url = validate_source_url(url).unwrap();
        self.ctx.task_manager.create_task(&url).await.unwrap().id
    }

    async fn wait_terminal(&self, task_id: &str) -> Task {
        for _ in 0..500 {
            if let Some(task) = self.ctx.task_manager.get_task(task_id).await {
                if task.state.is_terminal() {
                    return task;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never reached a terminal state", task_id);
    }

    /// Registers a task that already finished downloading, with its files.
    async fn ready_task(&self) -> String {
        let storage = self.ctx.task_manager.storage();
        let id = new_task_id();
        storage.create(&id, "https://example.com/v").await.unwrap();
        storage.set_state(&id, TaskState::Downloading, None).await.unwrap();
        storage.set_state(&id, TaskState::Ready, None).await.unwrap();
        std::fs::create_dir_all(task_dir(self.scratch.path(), &id)).unwrap();
        std::fs::write(primary_artifact(self.scratch.path(), &id), b"source").unwrap();
        id
    }
}

fn url_of(command: &ToolCommand) -> String {
    command.args.last().cloned().unwrap_or_default()
}

fn clip() -> ClipParams {
    ClipParams {
        start: 0.0,
        end: 2.0,
        fade_in: 0.0,
        fade_out: 0.0,
        denoise: false,
    }
}

#[tokio::test]
async fn test_successful_download_becomes_ready() {
    let mut env = TestEnv::new(FakeRunner::succeeding());
    env.start_worker();

    let id = env.submit("https://example.com/watch?v=ok").await;
    let task = env.wait_terminal(&id).await;

    assert_eq!(task.state, TaskState::Ready);
    assert!(task.error_message.is_none());
    assert!(primary_artifact(env.scratch.path(), &id).exists());

    let calls = env.runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, "yt-dlp");
    assert_eq!(url_of(&calls[0]), "https://example.com/watch?v=ok");
}

#[tokio::test]
async fn test_nonzero_exit_records_diagnostic() {
    let mut env = TestEnv::new(FakeRunner::failing(1, "ERROR: Unsupported URL\n"));
    env.start_worker();

    let id = env.submit("https://example.com/nothing-here").await;
    let task = env.wait_terminal(&id).await;

    assert_eq!(task.state, TaskState::Error);
    assert_eq!(task.error_message.as_deref(), Some("ERROR: Unsupported URL"));
}

#[tokio::test]
async fn test_silent_failure_gets_fallback_message() {
    let mut env = TestEnv::new(FakeRunner::failing(2, ""));
    env.start_worker();

    let id = env.submit("https://example.com/v").await;
    let task = env.wait_terminal(&id).await;

    assert_eq!(task.state, TaskState::Error);
    assert_eq!(task.error_message.as_deref(), Some("Download failed"));
}

#[tokio::test]
async fn test_exit_zero_without_artifact_is_error() {
    let mut env = TestEnv::new(FakeRunner::succeeding_without_output());
    env.start_worker();

    let id = env.submit("https://example.com/v").await;
    let task = env.wait_terminal(&id).await;

    assert_eq!(task.state, TaskState::Error);
    assert!(task.error_message.unwrap().contains("audio.m4a"));
}

#[tokio::test]
async fn test_tool_errors_end_in_error_state() {
    let mut env = TestEnv::new(FakeRunner::with_script(|command| {
        if url_of(command).contains("hang") {
            Err(ToolError::TimedOut {
                program: command.program.clone(),
                timeout: Duration::from_secs(1),
            })
        } else {
            Err(ToolError::Spawn {
                program: command.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            })
        }
    }));
    env.start_worker();

    let hung = env.submit("https://example.com/hang").await;
    let missing = env.submit("https://example.com/v").await;

    let task = env.wait_terminal(&hung).await;
    assert_eq!(task.state, TaskState::Error);
    assert!(task.error_message.unwrap().contains("timed out"));

    let task = env.wait_terminal(&missing).await;
    assert_eq!(task.state, TaskState::Error);
    assert!(task.error_message.unwrap().contains("failed to execute yt-dlp"));
}

#[tokio::test]
async fn test_directory_failure_still_ends_in_error() {
    let mut env = TestEnv::with_config(FakeRunner::succeeding(), |config| {
        config.scratch_dir = config.scratch_dir.join("occupied");
    });
    // a regular file where the scratch root should be
    std::fs::write(env.scratch.path().join("occupied"), b"").unwrap();
    env.start_worker();

    let id = env.submit("https://example.com/v").await;
    let task = env.wait_terminal(&id).await;

    assert_eq!(task.state, TaskState::Error);
    assert!(task.error_message.unwrap().starts_with("Failed to create task directory"));
    assert!(env.runner.calls().is_empty());
}

#[tokio::test]
async fn test_downloads_run_one_at_a_time_in_fifo_order() {
    let mut env = TestEnv::new(FakeRunner::succeeding().with_delay(Duration::from_millis(30)));

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(env.submit(&format!("https://example.com/v{}", i)).await);
    }
    assert_eq!(env.ctx.task_manager.queue_size(), 5);
    env.start_worker();

    for id in &ids {
        assert_eq!(env.wait_terminal(id).await.state, TaskState::Ready);
    }

    let order: Vec<String> = env.runner.calls().iter().map(url_of).collect();
    let expected: Vec<String> = (0..5).map(|i| format!("https://example.com/v{}", i)).collect();
    assert_eq!(order, expected);
    assert_eq!(env.runner.max_concurrency(), 1);
    assert_eq!(env.ctx.task_manager.queue_size(), 0);
}

#[tokio::test]
async fn test_bad_tasks_do_not_stop_the_worker() {
    let mut env = TestEnv::new(FakeRunner::with_script(|command| {
        let url = url_of(command);
        if url.contains("panic") {
            panic!("tool wrapper blew up");
        }
        if url.contains("bad") {
            return Ok(exit(1, "ERROR: bad"));
        }
        let template = command.flag_value("-o").unwrap_or_default();
        std::fs::write(template.replace("%(ext)s", "m4a"), b"audio").unwrap();
        Ok(exit(0, ""))
    }));
    env.start_worker();

    let panicking = env.submit("https://example.com/panic").await;
    let bad = env.submit("https://example.com/bad").await;
    let good = env.submit("https://example.com/good").await;

    let task = env.wait_terminal(&panicking).await;
    assert_eq!(task.state, TaskState::Error);
    assert!(!task.error_message.unwrap().is_empty());

    assert_eq!(env.wait_terminal(&bad).await.state, TaskState::Error);
    assert_eq!(env.wait_terminal(&good).await.state, TaskState::Ready);
}

#[tokio::test]
async fn test_missing_task_is_skipped() {
    let mut env = TestEnv::new(FakeRunner::succeeding());

    let removed = env.submit("https://example.com/removed").await;
    let kept = env.submit("https://example.com/kept").await;
    env.ctx.task_manager.storage().remove(&removed).await;
    env.start_worker();

    assert_eq!(env.wait_terminal(&kept).await.state, TaskState::Ready);
    let urls: Vec<String> = env.runner.calls().iter().map(url_of).collect();
    assert_eq!(urls, vec!["https://example.com/kept".to_string()]);
}

#[tokio::test]
async fn test_observed_states_follow_the_state_machine() {
    let mut env = TestEnv::new(FakeRunner::succeeding().with_delay(Duration::from_millis(50)));
    let id = env.submit("https://example.com/v").await;

    let observer = {
        let ctx = env.ctx.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let mut seen: Vec<TaskState> = Vec::new();
            loop {
                let state = ctx.task_manager.get_task(&id).await.unwrap().state;
                if seen.last() != Some(&state) {
                    seen.push(state);
                }
                if state.is_terminal() {
                    return seen;
                }
                sleep(Duration::from_millis(2)).await;
            }
        })
    };
    env.start_worker();

    let seen = observer.await.unwrap();
    assert_eq!(seen.first(), Some(&TaskState::Queued));
    assert_eq!(seen.last(), Some(&TaskState::Ready));
    for pair in seen.windows(2) {
        assert!(pair[0].can_transition_to(pair[1]), "{:?}", seen);
    }
}

#[tokio::test]
async fn test_sweep_removes_aged_and_keeps_young() {
    let env = TestEnv::with_config(FakeRunner::succeeding(), |config| {
        config.retention = Duration::from_millis(100);
    });

    let old = env.ready_task().await;
    sleep(Duration::from_millis(250)).await;
    let young = env.ready_task().await;

    let stats = env.ctx.sweeper.sweep().await.unwrap();
    assert_eq!(stats.directories_removed, 1);
    assert_eq!(stats.tasks_removed, 1);

    assert!(!task_dir(env.scratch.path(), &old).exists());
    assert!(env.ctx.task_manager.get_task(&old).await.is_none());
    assert!(task_dir(env.scratch.path(), &young).exists());
    assert!(env.ctx.task_manager.get_task(&young).await.is_some());
}

#[tokio::test]
async fn test_sweep_never_reclaims_active_tasks() {
    let env = TestEnv::with_config(FakeRunner::succeeding(), |config| {
        config.retention = Duration::from_millis(10);
    });
    let storage = env.ctx.task_manager.storage();

    let downloading = new_task_id();
    storage.create(&downloading, "https://example.com/v").await.unwrap();
    storage.set_state(&downloading, TaskState::Downloading, None).await.unwrap();
    std::fs::create_dir_all(task_dir(env.scratch.path(), &downloading)).unwrap();
    sleep(Duration::from_millis(50)).await;

    let stats = env.ctx.sweeper.sweep().await.unwrap();
    assert_eq!(stats, SweepStats::default());
    assert!(task_dir(env.scratch.path(), &downloading).exists());
}

#[tokio::test]
async fn test_sweep_reclaims_orphan_directories_by_mtime() {
    let env = TestEnv::with_config(FakeRunner::succeeding(), |config| {
        config.retention = Duration::from_millis(50);
    });
    let orphan = new_task_id();
    std::fs::create_dir_all(task_dir(env.scratch.path(), &orphan)).unwrap();
    std::fs::create_dir_all(env.scratch.path().join("keep-me")).unwrap();
    sleep(Duration::from_millis(150)).await;

    let stats = env.ctx.sweeper.sweep().await.unwrap();
    assert_eq!(stats.directories_removed, 1);
    assert_eq!(stats.tasks_removed, 0);
    assert!(!task_dir(env.scratch.path(), &orphan).exists());
    assert!(env.scratch.path().join("keep-me").exists());
}

#[tokio::test]
async fn test_sweep_prunes_terminal_entries_without_directory() {
    let env = TestEnv::new(FakeRunner::succeeding());
    let storage = env.ctx.task_manager.storage();

    let ready = env.ready_task().await;
    std::fs::remove_dir_all(task_dir(env.scratch.path(), &ready)).unwrap();
    let queued = new_task_id();
    storage.create(&queued, "https://example.com/q").await.unwrap();

    let stats = env.ctx.sweeper.sweep().await.unwrap();
    assert_eq!(stats.tasks_removed, 1);
    assert!(storage.get(&ready).await.is_none());
    assert!(storage.get(&queued).await.is_some());
}

#[tokio::test]
async fn test_processing_keeps_task_alive() {
    let env = TestEnv::with_config(FakeRunner::succeeding(), |config| {
        config.retention = Duration::from_millis(200);
    });
    let id = env.ready_task().await;
    sleep(Duration::from_millis(300)).await;

    env.ctx.clip_processor.process(&id, &clip()).await.unwrap();
    env.ctx.sweeper.sweep().await.unwrap();

    assert!(task_dir(env.scratch.path(), &id).exists());
    assert_eq!(
        env.ctx.task_manager.get_task(&id).await.unwrap().state,
        TaskState::Ready
    );
}

#[tokio::test]
async fn test_sweep_waits_for_in_flight_processing() {
    let env = TestEnv::with_config(
        FakeRunner::succeeding().with_delay(Duration::from_millis(200)),
        |config| config.retention = Duration::ZERO,
    );
    let id = env.ready_task().await;

    let processing = {
        let ctx = env.ctx.clone();
        let id = id.clone();
        tokio::spawn(async move { ctx.clip_processor.process(&id, &clip()).await })
    };
    sleep(Duration::from_millis(50)).await;

    let stats = env.ctx.sweeper.sweep().await.unwrap();
    assert_eq!(stats.directories_removed, 0);
    assert!(task_dir(env.scratch.path(), &id).exists());

    let artifact = processing.await.unwrap().unwrap();
    assert!(artifact.path.exists());

    sleep(Duration::from_millis(20)).await;
    let stats = env.ctx.sweeper.sweep().await.unwrap();
    assert_eq!(stats.directories_removed, 1);
    assert!(matches!(
        env.ctx.clip_processor.process(&id, &clip()).await,
        Err(ProcessError::TaskNotFound)
    ));
}

#[tokio::test]
async fn test_concurrent_sweeps_and_processing_stay_consistent() {
    let env = TestEnv::with_config(
        FakeRunner::succeeding().with_delay(Duration::from_millis(5)),
        |config| config.retention = Duration::ZERO,
    );
    let id = env.ready_task().await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let ctx = env.ctx.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            sleep(Duration::from_millis(i % 7)).await;
            if i % 2 == 0 {
                ctx.sweeper.sweep().await.map(|_| ()).map_err(|e| e.to_string())
            } else {
                match ctx.clip_processor.process(&id, &clip()).await {
                    Ok(_) | Err(ProcessError::TaskNotFound) | Err(ProcessError::SourceMissing) => Ok(()),
                    Err(e) => Err(e.to_string()),
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    match env.ctx.task_manager.get_task(&id).await {
        Some(task) => {
            assert_eq!(task.state, TaskState::Ready);
            assert!(task_dir(env.scratch.path(), &id).exists());
        }
        None => assert!(!task_dir(env.scratch.path(), &id).exists()),
    }
}

#[tokio::test]
async fn test_failed_sweep_does_not_end_the_loop() {
    let env = TestEnv::with_config(FakeRunner::succeeding(), |config| {
        config.scratch_dir = config.scratch_dir.join("occupied");
        config.sweep_interval = Duration::from_millis(10);
        config.sweep_retry_interval = Duration::from_millis(10);
    });
    std::fs::write(env.scratch.path().join("occupied"), b"").unwrap();

    assert!(env.ctx.sweeper.sweep().await.is_err());

    let handle = tokio::spawn(env.ctx.sweeper.clone().run());
    sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished());
    handle.abort();
}

#[tokio::test]
async fn test_storage_usage() {
    let env = TestEnv::new(FakeRunner::succeeding());
    env.ready_task().await;
    env.ready_task().await;

    let usage = env.ctx.sweeper.storage_usage().await.unwrap();
    assert_eq!(usage.directories, 2);
    assert_eq!(usage.bytes, 12);
}

/// Registry whose reads return a snapshot that has already gone stale.
struct SlowReads {
    inner: Arc<dyn crate::storage::task::TaskStorage>,
    delay: Duration,
}

#[async_trait::async_trait]
impl crate::storage::task::TaskStorage for SlowReads {
    async fn create(&self, task_id: &str, source_url: &str) -> Result<Task, crate::error::StorageError> {
        self.inner.create(task_id, source_url).await
    }

    async fn get(&self, task_id: &str) -> Option<Task> {
        let task = self.inner.get(task_id).await;
        sleep(self.delay).await;
        task
    }

    async fn set_state(
        &self,
        task_id: &str,
        state: TaskState,
        error_message: Option<String>,
    ) -> Result<Task, crate::error::StorageError> {
        self.inner.set_state(task_id, state, error_message).await
    }

    async fn touch(&self, task_id: &str) -> Result<(), crate::error::StorageError> {
        self.inner.touch(task_id).await
    }

    async fn remove(&self, task_id: &str) -> Option<Task> {
        self.inner.remove(task_id).await
    }

    async fn size(&self) -> usize {
        self.inner.size().await
    }

    async fn all(&self) -> Vec<Task> {
        self.inner.all().await
    }
}

#[tokio::test]
async fn test_sweep_rechecks_age_before_reclaiming() {
    use crate::audio::clip::ClipProcessor;
    use crate::storage::task::{ArtifactLeases, InMemoryTaskStorage, TaskStorage};

    let scratch = TempDir::new().unwrap();
    let mut config = Config::with_scratch_dir(scratch.path());
    config.retention = Duration::from_millis(500);
    let config = Arc::new(config);

    let storage: Arc<dyn TaskStorage> = Arc::new(InMemoryTaskStorage::new());
    let leases = Arc::new(ArtifactLeases::new());
    let processor = ClipProcessor::new(
        storage.clone(),
        Arc::new(FakeRunner::succeeding()),
        leases.clone(),
        config.clone(),
    );
    let slow: Arc<dyn TaskStorage> = Arc::new(SlowReads {
        inner: storage.clone(),
        delay: Duration::from_millis(100),
    });
    let sweeper = Arc::new(CleanupSweeper::new(slow, leases, &config));

    let id = new_task_id();
    storage.create(&id, "https://example.com/v").await.unwrap();
    storage.set_state(&id, TaskState::Downloading, None).await.unwrap();
    storage.set_state(&id, TaskState::Ready, None).await.unwrap();
    std::fs::create_dir_all(task_dir(scratch.path(), &id)).unwrap();
    std::fs::write(primary_artifact(scratch.path(), &id), b"source").unwrap();
    sleep(Duration::from_millis(600)).await;

    // the sweep reads an expired snapshot, then the task is used before it acts
    let sweep = tokio::spawn({
        let sweeper = sweeper.clone();
        async move { sweeper.sweep().await }
    });
    sleep(Duration::from_millis(30)).await;
    processor.process(&id, &clip()).await.unwrap();

    let stats = sweep.await.unwrap().unwrap();
    assert_eq!(stats.directories_removed, 0);
    assert_eq!(stats.tasks_removed, 0);
    assert!(task_dir(scratch.path(), &id).exists());
    assert_eq!(storage.get(&id).await.unwrap().state, TaskState::Ready);
}
