//! Subprocess execution for step commands and fix commands

pub mod output;
pub mod shell;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use output::{ProcessError, ProcessOutput, ProcessRequest};
pub use shell::ShellExecutor;

/// Trait for process execution - allows for different implementations
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run a command to completion, killing it once `timeout` elapses
    async fn run(
        &self,
        request: &ProcessRequest,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError>;
}

#[async_trait]
impl<P: ProcessExecutor + ?Sized> ProcessExecutor for Arc<P> {
    async fn run(
        &self,
        request: &ProcessRequest,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        (**self).run(request, timeout).await
    }
}
