use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ToolCommand, ToolOutput, ToolRunner};
use crate::error::ToolError;

/// Runs tools as real child processes.
pub struct CommandRunner {
    timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ToolRunner for CommandRunner {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, ToolError> {
        debug!("Running {}", command);

        // kill_on_drop reaps the child when the timeout drops the future
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let output = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    warn!("{} timed out after {}s", command.program, timeout.as_secs());
                    return Err(ToolError::TimedOut {
                        program: command.program.clone(),
                        timeout,
                    });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|source| ToolError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
