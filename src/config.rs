use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::{LOG_PATH, SCRATCH_PATH};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DOWNLOAD_TOOL: &str = "yt-dlp";
const DEFAULT_TRANSCODE_TOOL: &str = "ffmpeg";
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_SWEEP_RETRY_SECS: u64 = 60;
const DEFAULT_RETENTION_SECS: u64 = 60 * 60;
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";

/// Runtime settings for the clip service.
///
/// Values come from the process environment first and from `.env` second,
/// falling back to the defaults above.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding one artifact directory per task.
    pub scratch_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub log_dir: PathBuf,
    pub download_tool: String,
    pub transcode_tool: String,
    /// `None` disables the subprocess timeout.
    pub tool_timeout: Option<Duration>,
    pub sweep_interval: Duration,
    pub sweep_retry_interval: Duration,
    pub retention: Duration,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let timeout_secs: u64 = parse_var("CLIP_TOOL_TIMEOUT_SECS", DEFAULT_TOOL_TIMEOUT_SECS)?;

        Ok(Self {
            scratch_dir: PathBuf::from(SCRATCH_PATH.as_str()),
            bind_addr: parse_var("CLIP_BIND_ADDR", DEFAULT_BIND_ADDR.parse()?)?,
            log_dir: PathBuf::from(LOG_PATH.as_str()),
            download_tool: var("CLIP_DOWNLOAD_TOOL")
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_TOOL.to_string()),
            transcode_tool: var("CLIP_TRANSCODE_TOOL")
                .unwrap_or_else(|| DEFAULT_TRANSCODE_TOOL.to_string()),
            tool_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            sweep_interval: Duration::from_secs(parse_var(
                "CLIP_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )?),
            sweep_retry_interval: Duration::from_secs(parse_var(
                "CLIP_SWEEP_RETRY_SECS",
                DEFAULT_SWEEP_RETRY_SECS,
            )?),
            retention: Duration::from_secs(parse_var("CLIP_RETENTION_SECS", DEFAULT_RETENTION_SECS)?),
            cors_origins: split_origins(
                &var("CLIP_CORS_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string()),
            ),
        })
    }

    /// Defaults rooted at `scratch_dir`; used by tests and embedders.
    pub fn with_scratch_dir(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_dir: PathBuf::from("./logs"),
            download_tool: DEFAULT_DOWNLOAD_TOOL.to_string(),
            transcode_tool: DEFAULT_TRANSCODE_TOOL.to_string(),
            tool_timeout: Some(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS)),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            sweep_retry_interval: Duration::from_secs(DEFAULT_SWEEP_RETRY_SECS),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            cors_origins: split_origins(DEFAULT_CORS_ORIGINS),
        }
    }
}

/// Reads `key` from the environment, then from `.env`.
pub(crate) fn var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) => Some(value),
        Err(_) => dotenv::var(key).ok(),
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}
