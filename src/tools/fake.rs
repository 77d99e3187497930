//! Scripted `ToolRunner` for tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ToolCommand, ToolOutput, ToolRunner};
use crate::error::ToolError;

type Script = Box<dyn Fn(&ToolCommand) -> Result<ToolOutput, ToolError> + Send + Sync>;

pub struct FakeRunner {
    script: Script,
    delay: Duration,
    calls: Mutex<Vec<ToolCommand>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeRunner {
    pub fn with_script<F>(script: F) -> Self
    where
        F: Fn(&ToolCommand) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Exits 0 and writes the file the command was asked to produce.
    pub fn succeeding() -> Self {
        Self::with_script(|command| {
            let Some(path) = output_path(command) else {
                return Ok(exit(0, ""));
            };
            match std::fs::write(&path, b"fake audio") {
                Ok(()) => Ok(exit(0, "")),
                Err(e) => Ok(exit(1, &format!("cannot write {}: {}", path.display(), e))),
            }
        })
    }

    /// Exits 0 without producing anything.
    pub fn succeeding_without_output() -> Self {
        Self::with_script(|_| Ok(exit(0, "")))
    }

    pub fn failing(code: i32, stderr: &'static str) -> Self {
        Self::with_script(move |_| Ok(exit(code, stderr)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, ToolError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.script)(command);

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn exit(code: i32, stderr: &str) -> ToolOutput {
    ToolOutput {
        exit_code: Some(code),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Output file of a download (`-o` template) or transcode (last argument) command.
fn output_path(command: &ToolCommand) -> Option<PathBuf> {
    if let Some(template) = command.flag_value("-o") {
        return Some(PathBuf::from(template.replace("%(ext)s", "m4a")));
    }
    command.args.last().map(PathBuf::from)
}
