//! Shell subprocess executor - runs commands through `sh -c`

use crate::process::{ProcessError, ProcessExecutor, ProcessOutput, ProcessRequest};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Executes commands as shell subprocesses
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    /// Shell executable
    shell: String,

    /// Arguments placed before the command line
    shell_args: Vec<String>,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            shell_args: vec!["-c".to_string()],
        }
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn shell(&self) -> &str {
        &self.shell
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

#[async_trait]
impl ProcessExecutor for ShellExecutor {
    /// Run a command, capturing combined output.
    ///
    /// On timeout the child is killed; grandchildren that inherited the pipes
    /// are not waited for.
    async fn run(
        &self,
        request: &ProcessRequest,
        limit: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        debug!("Spawning `{}` (timeout {:?})", request.command, limit);

        let mut cmd = Command::new(&self.shell);
        cmd.args(&self.shell_args)
            .arg(&request.command)
            .env_clear()
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::Spawn(format!("{}: {}", request.command, e)))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        // Background jobs can hold the pipes open after the shell exits, so
        // draining the output counts against the same deadline.
        let capture = async {
            let status = child.wait().await;
            for reader in readers.iter_mut() {
                // A reader only fails if it panicked; its lines are lost either way.
                let _ = reader.await;
            }
            status
        };
        let waited = timeout(limit, capture).await;

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(ProcessError::Internal(format!(
                    "Failed to wait for `{}`: {}",
                    request.command, e
                )))
            }
            Err(_) => {
                warn!("Killing `{}` after {:?}", request.command, limit);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill `{}`: {}", request.command, e);
                }
                for reader in &readers {
                    reader.abort();
                }
                return Err(ProcessError::Timeout(limit));
            }
        };

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }

        debug!(
            "`{}` exited with {:?} ({} lines of output)",
            request.command,
            status.code(),
            lines.len()
        );

        Ok(ProcessOutput {
            exit_code: status.code(),
            lines,
        })
    }
}
