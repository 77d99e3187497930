//! External tool invocation.
//!
//! The download and transcode tools are opaque subprocesses: the service only
//! looks at their exit code, their stderr and whether the expected file exists.

use std::fmt::Display;

use async_trait::async_trait;

use crate::error::ToolError;

pub mod command;
#[cfg(test)]
pub(crate) mod fake;

pub use command::CommandRunner;

/// Upper bound on diagnostic text kept from a tool's stderr.
const MAX_DIAGNOSTIC_BYTES: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }
}

impl Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stderr made fit for an error message, or `fallback` when empty.
    pub fn diagnostic(&self, fallback: &str) -> String {
        sanitize_diagnostic(&self.stderr, fallback)
    }
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, ToolError>;
}

/// Decodes lossily, trims, and keeps the tail since tools print the actual
/// error last.
pub fn sanitize_diagnostic(raw: &[u8], fallback: &str) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return fallback.to_string();
    }
    if text.len() <= MAX_DIAGNOSTIC_BYTES {
        return text.to_string();
    }

    let mut start = text.len() - MAX_DIAGNOSTIC_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
