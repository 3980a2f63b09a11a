//! Step runner - executes one step with templating, timeout and retry/backoff

use crate::{
    core::{Step, StepError},
    execution::{
        events::{EventBus, ExecutionEvent},
        tracker::ExecutionTracker,
    },
    process::{ProcessError, ProcessExecutor, ProcessRequest},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Output lines kept in a step error message
const ERROR_OUTPUT_LINES: usize = 20;

/// Delay before retry number `retry` (1-based): `unit * 2^retry`
pub fn backoff_delay(unit: Duration, retry: u32) -> Duration {
    unit.saturating_mul(2u32.saturating_pow(retry))
}

/// Executes single steps on behalf of an execution
pub struct StepRunner<P> {
    executor: Arc<P>,
    tracker: Arc<ExecutionTracker>,
    events: EventBus,
    backoff_unit: Duration,
    max_attempts: Option<u32>,
}

impl<P: ProcessExecutor> StepRunner<P> {
    pub fn new(executor: Arc<P>, tracker: Arc<ExecutionTracker>, events: EventBus) -> Self {
        Self {
            executor,
            tracker,
            events,
            backoff_unit: Duration::from_secs(1),
            max_attempts: None,
        }
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Bound the total attempts of a step regardless of its `max_retries`
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Run a step to success or final failure.
    ///
    /// `step` is the execution's private copy; its `retry_count` is advanced
    /// here and mirrored into the execution record.
    pub async fn run(
        &self,
        execution_id: &str,
        step: &mut Step,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StepError> {
        let name = step.name.clone();
        self.tracker
            .update(execution_id, |record| record.current_step = Some(name.clone()))
            .await;

        let command = match step.render_command(metadata) {
            Ok(command) => command,
            Err(e) => {
                error!("Execution {}: {}", execution_id, e);
                self.fail(execution_id, &e).await;
                return Err(e);
            }
        };

        let request = ProcessRequest::new(command)
            .with_env(step.merged_environment(std::env::vars()))
            .with_working_dir(step.working_directory.clone());

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            info!("Execution {}: running step {} (attempt {})", execution_id, name, attempt);
            self.tracker
                .log(
                    execution_id,
                    format!("Step {} started (attempt {}): {}", name, attempt, request.command),
                )
                .await;
            self.events.emit(ExecutionEvent::StepStarted {
                execution_id: execution_id.to_string(),
                step: name.clone(),
                attempt,
            });

            let err = match self.executor.run(&request, step.timeout).await {
                Ok(output) => {
                    self.tracker
                        .update(execution_id, |record| {
                            for line in &output.lines {
                                record.push_log(format!("[{}] {}", name, line));
                            }
                        })
                        .await;

                    if output.success() {
                        info!("Step {} completed successfully", name);
                        self.tracker
                            .log(execution_id, format!("Step {} completed successfully", name))
                            .await;
                        self.events.emit(ExecutionEvent::StepCompleted {
                            execution_id: execution_id.to_string(),
                            step: name.clone(),
                        });
                        return Ok(());
                    }

                    StepError::NonZeroExit {
                        step: name.clone(),
                        exit_code: output.exit_code.unwrap_or(-1),
                        output: output.tail(ERROR_OUTPUT_LINES),
                    }
                }
                Err(ProcessError::Timeout(limit)) => StepError::Timeout {
                    step: name.clone(),
                    timeout: limit,
                },
                Err(e) => StepError::Spawn {
                    step: name.clone(),
                    message: e.to_string(),
                },
            };

            if err.is_retryable() && step.can_retry() && self.attempts_left(attempt) {
                step.retry_count += 1;
                let retry = step.retry_count;
                let delay = backoff_delay(self.backoff_unit, retry);

                warn!(
                    "Step {} failed, retry {}/{} in {:?}: {}",
                    name, retry, step.max_retries, delay, err
                );
                self.tracker
                    .update(execution_id, |record| {
                        if let Some(copy) = record.step_mut(&name) {
                            copy.retry_count = retry;
                        }
                        record.push_log(format!(
                            "Step {} failed ({}); retry {}/{} in {:?}",
                            name, err, retry, step.max_retries, delay
                        ));
                    })
                    .await;
                self.events.emit(ExecutionEvent::StepRetrying {
                    execution_id: execution_id.to_string(),
                    step: name.clone(),
                    retry,
                    max_retries: step.max_retries,
                    delay,
                });

                tokio::time::sleep(delay).await;
                continue;
            }

            error!("Execution {}: {}", execution_id, err);
            self.fail(execution_id, &err).await;
            return Err(err);
        }
    }

    fn attempts_left(&self, attempts_made: u32) -> bool {
        match self.max_attempts {
            Some(max) => {
                let left = attempts_made < max;
                if !left {
                    debug!("Attempt cap of {} reached", max);
                }
                left
            }
            None => true,
        }
    }

    async fn fail(&self, execution_id: &str, err: &StepError) {
        self.tracker
            .log(execution_id, format!("Step {} failed: {}", err.step(), err))
            .await;
        self.events.emit(ExecutionEvent::StepFailed {
            execution_id: execution_id.to_string(),
            step: err.step().to_string(),
            error: err.to_string(),
        });
    }
}
