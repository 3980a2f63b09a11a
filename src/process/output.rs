//! Process request/output types

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error types for process execution
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Timeout after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A fully rendered command ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    /// Shell command line
    pub command: String,

    /// Complete environment of the child (ambient merged with overrides)
    pub env: HashMap<String, String>,

    /// Working directory; inherits the engine's when `None`
    pub working_dir: Option<PathBuf>,
}

impl ProcessRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: HashMap::new(),
            working_dir: None,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }
}

/// Result of a process that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,

    /// Combined stdout/stderr lines, in arrival order
    pub lines: Vec<String>,
}

impl ProcessOutput {
    pub fn new(exit_code: i32, output: &str) -> Self {
        Self {
            exit_code: Some(exit_code),
            lines: output.lines().map(str::to_string).collect(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last `n` lines, used in error messages
    pub fn tail(&self, n: usize) -> String {
        let start = self.lines.len().saturating_sub(n);
        self.lines[start..].join("\n")
    }
}
