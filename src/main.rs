#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;

use anyhow::Result;
use clip_rs::{
    config::Config, init_env, schedule::TaskScheduler, tools::CommandRunner, utils::logger,
    AppContext,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载环境变量并创建目录
    init_env()?;
    let config = Config::from_env()?;

    // 初始化日志系统
    let _guard = logger::init(&config.log_dir)?;
    info!("Starting Audio Clip service ({})...", env!("GIT_HASH"));
    info!(
        "Scratch dir: {}, retention: {}s, sweep interval: {}s",
        config.scratch_dir.display(),
        config.retention.as_secs(),
        config.sweep_interval.as_secs()
    );

    // 初始化外部工具
    let runner = Arc::new(CommandRunner::new(config.tool_timeout));
    let addr = config.bind_addr;

    // 创建应用上下文
    let (ctx, worker) = AppContext::build(config, runner);

    // 启动下载 worker 和清理任务
    info!("Initializing Scheduler...");
    let scheduler = TaskScheduler::new();
    scheduler.spawn_worker(worker).await;
    scheduler.spawn_sweeper(ctx.sweeper.clone()).await;

    // 启动 HTTP 服务器
    info!("Starting HTTP server at http://{}", addr);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    };
    let result = clip_rs::web::start_server(ctx, addr, shutdown).await;

    // 优雅关闭
    info!("Shutting down...");
    scheduler.shutdown().await;

    match result {
        Ok(()) => {
            info!("Server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e)
        }
    }
}
