//! Auto-healer - runs keyword-matched remediation commands after a failure

use crate::{
    core::{ErrorPatternRegistry, ExecutionRecord},
    execution::tracker::ExecutionTracker,
    process::{ProcessExecutor, ProcessRequest},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What a heal attempt did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealReport {
    /// Name of the matched pattern, if any
    pub pattern: Option<String>,
    pub fixes_run: usize,
    pub fixes_succeeded: usize,
}

impl HealReport {
    /// Whether at least one fix command succeeded
    pub fn fix_applied(&self) -> bool {
        self.fixes_succeeded > 0
    }
}

/// Matches failures against the pattern registry and applies fixes
pub struct AutoHealer<P> {
    executor: Arc<P>,
    patterns: Arc<ErrorPatternRegistry>,
    tracker: Arc<ExecutionTracker>,
    fix_timeout: Duration,
}

impl<P: ProcessExecutor> AutoHealer<P> {
    pub fn new(
        executor: Arc<P>,
        patterns: Arc<ErrorPatternRegistry>,
        tracker: Arc<ExecutionTracker>,
        fix_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            patterns,
            tracker,
            fix_timeout,
        }
    }

    /// Try to remediate a failed execution.
    ///
    /// Only the first matching pattern is used. Its fix commands run in order
    /// and a failing fix does not stop the ones after it. Never fails; every
    /// problem is logged and reflected in the report.
    pub async fn heal(&self, record: &ExecutionRecord, error_message: &str) -> HealReport {
        let Some(pattern) = self.patterns.find_match(error_message) else {
            info!("Execution {}: no error pattern matched, not healing", record.id);
            return HealReport::default();
        };

        info!(
            "Execution {}: matched error pattern '{}' ({}), running {} fix command(s)",
            record.id,
            pattern.name,
            pattern.description,
            pattern.fix_commands.len()
        );

        let mut report = HealReport {
            pattern: Some(pattern.name.clone()),
            ..HealReport::default()
        };

        for command in &pattern.fix_commands {
            report.fixes_run += 1;
            let request = ProcessRequest::new(command.clone()).with_env(std::env::vars().collect());

            match self.executor.run(&request, self.fix_timeout).await {
                Ok(output) if output.success() => {
                    info!("Fix command `{}` succeeded", command);
                    report.fixes_succeeded += 1;
                }
                Ok(output) => warn!(
                    "Fix command `{}` exited with {:?}: {}",
                    command,
                    output.exit_code,
                    output.tail(5)
                ),
                Err(e) => warn!("Fix command `{}` failed: {}", command, e),
            }
        }

        if report.fix_applied() {
            self.tracker.record_auto_fix().await;
        } else {
            warn!(
                "Execution {}: no fix command of pattern '{}' succeeded",
                record.id, pattern.name
            );
        }

        report
    }
}
