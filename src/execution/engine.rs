//! Main execution engine - orchestrates pipeline runs, auto-healing and tuning

use crate::{
    core::{
        config::{EngineConfig, EngineSettings},
        EngineError, ErrorPatternRegistry, ExecutionRecord, ExecutionStatus, ExecutionSummary,
        HealState, PipelineCatalog, StatusReport, Step, StepError,
    },
    execution::{
        events::{EventBus, ExecutionEvent},
        healer::AutoHealer,
        optimizer::{OptimizationSummary, Optimizer},
        runner::StepRunner,
        scheduler::{ExecutionScheduler, SchedulerDecision},
        tracker::{AggregateStats, ExecutionTracker},
    },
    process::ProcessExecutor,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Interval used by the polling helpers
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Pipeline execution engine.
///
/// Cheap to clone; all clones share the same catalog, records and
/// optimizer task.
pub struct Engine<P> {
    inner: Arc<EngineInner<P>>,
}

impl<P> Clone for Engine<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EngineInner<P> {
    catalog: Arc<PipelineCatalog>,
    tracker: Arc<ExecutionTracker>,
    runner: StepRunner<P>,
    healer: AutoHealer<P>,
    optimizer: Arc<Optimizer>,
    settings: EngineSettings,
    events: EventBus,
    optimizer_task: Mutex<Option<JoinHandle<()>>>,
}

impl<P: ProcessExecutor + 'static> Engine<P> {
    pub fn new(
        catalog: PipelineCatalog,
        patterns: ErrorPatternRegistry,
        settings: EngineSettings,
        executor: P,
    ) -> Self {
        let executor = Arc::new(executor);
        let catalog = Arc::new(catalog);
        let tracker = Arc::new(ExecutionTracker::new());
        let events = EventBus::new();

        let runner = StepRunner::new(executor.clone(), tracker.clone(), events.clone())
            .with_backoff_unit(settings.backoff_unit())
            .with_max_attempts(settings.max_step_attempts);
        let healer = AutoHealer::new(
            executor,
            Arc::new(patterns),
            tracker.clone(),
            settings.fix_timeout(),
        );
        let optimizer = Arc::new(Optimizer::new(
            catalog.clone(),
            tracker.clone(),
            settings.clone(),
        ));

        Self {
            inner: Arc::new(EngineInner {
                catalog,
                tracker,
                runner,
                healer,
                optimizer,
                settings,
                events,
                optimizer_task: Mutex::new(None),
            }),
        }
    }

    /// Build an engine from a loaded configuration
    pub fn from_config(config: &EngineConfig, executor: P) -> Self {
        Self::new(
            config.to_catalog(),
            config.to_registry(),
            config.settings.clone(),
            executor,
        )
    }

    /// Submit a pipeline run and return its execution id.
    ///
    /// Only configuration errors are returned here; everything that goes
    /// wrong while running is recorded on the execution.
    pub async fn execute(
        &self,
        pipeline_name: &str,
        execution_id: Option<String>,
        parameters: HashMap<String, String>,
    ) -> Result<String, EngineError> {
        let id = execution_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        self.inner
            .prepare(pipeline_name, id.clone(), parameters, 0)
            .await?;

        info!("Submitted execution {} of pipeline {}", id, pipeline_name);
        let inner = Arc::clone(&self.inner);
        let first = id.clone();
        tokio::spawn(async move { inner.drive(first).await });

        Ok(id)
    }

    pub async fn status(&self, execution_id: &str) -> Option<StatusReport> {
        self.inner.tracker.status(execution_id).await
    }

    pub async fn logs(&self, execution_id: &str) -> Option<Vec<String>> {
        self.inner.tracker.logs(execution_id).await
    }

    pub async fn list_pipelines(&self) -> Vec<String> {
        self.inner.catalog.names().await
    }

    /// Most recent executions first
    pub async fn list_executions(&self, limit: usize) -> Vec<ExecutionSummary> {
        self.inner.tracker.list(limit).await
    }

    /// Run one tuning and cleanup pass now
    pub async fn optimize(&self) -> OptimizationSummary {
        self.inner.optimizer.run_pass(Utc::now()).await
    }

    pub async fn stats(&self) -> AggregateStats {
        self.inner.tracker.stats().await
    }

    /// Start the periodic optimizer; calling it twice is a no-op
    pub async fn start(&self) {
        let mut task = self.inner.optimizer_task.lock().await;
        if task.is_none() {
            info!(
                "Starting optimizer (every {:?})",
                self.inner.settings.optimization_interval()
            );
            *task = Some(Arc::clone(&self.inner.optimizer).spawn());
        }
    }

    /// Stop the optimizer and cancel running executions.
    ///
    /// Subprocesses that are already running are left to finish.
    pub async fn stop(&self) {
        if let Some(task) = self.inner.optimizer_task.lock().await.take() {
            task.abort();
        }
        let cancelled = self.inner.tracker.cancel_running().await;
        for id in &cancelled {
            self.inner.events.emit(ExecutionEvent::ExecutionFinished {
                execution_id: id.clone(),
                status: ExecutionStatus::Cancelled,
                error: Some("Engine stopped".to_string()),
            });
        }
        info!("Engine stopped, {} execution(s) cancelled", cancelled.len());
    }

    /// Register an event handler
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler);
    }

    pub fn catalog(&self) -> &Arc<PipelineCatalog> {
        &self.inner.catalog
    }

    pub fn tracker(&self) -> &Arc<ExecutionTracker> {
        &self.inner.tracker
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Poll until the execution is terminal, or `None` on timeout / unknown id
    pub async fn wait_for_terminal(
        &self,
        execution_id: &str,
        timeout: Duration,
    ) -> Option<StatusReport> {
        self.wait_until(execution_id, timeout, |report| report.status.is_terminal())
            .await
    }

    /// Poll until the execution is terminal and its auto-heal (if any) settled
    pub async fn wait_until_settled(
        &self,
        execution_id: &str,
        timeout: Duration,
    ) -> Option<StatusReport> {
        self.wait_until(execution_id, timeout, |report| {
            report.status.is_terminal() && report.heal.as_ref().map_or(true, HealState::is_settled)
        })
        .await
    }

    async fn wait_until<F>(
        &self,
        execution_id: &str,
        timeout: Duration,
        done: F,
    ) -> Option<StatusReport>
    where
        F: Fn(&StatusReport) -> bool,
    {
        let poll = async {
            loop {
                let report = self.status(execution_id).await?;
                if done(&report) {
                    return Some(report);
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.ok().flatten()
    }
}

impl<P: ProcessExecutor + 'static> EngineInner<P> {
    /// Create and track a pending record with a private copy of the steps
    async fn prepare(
        &self,
        pipeline_name: &str,
        id: String,
        parameters: HashMap<String, String>,
        heal_depth: u32,
    ) -> Result<(), EngineError> {
        let pipeline = self
            .catalog
            .get(pipeline_name)
            .await
            .ok_or_else(|| EngineError::UnknownPipeline(pipeline_name.to_string()))?;

        let mut record = ExecutionRecord::new(id, pipeline.name, pipeline.steps, parameters);
        record.heal_depth = heal_depth;
        self.tracker.insert(record).await
    }

    /// Run an execution and then every auto-heal resubmission it leads to
    async fn drive(self: Arc<Self>, first: String) {
        let mut next = Some(first);
        while let Some(id) = next.take() {
            let result = self.run_steps(&id).await;
            if let Some(error) = self.complete(&id, result).await {
                next = self.heal(&id, &error).await;
            }
        }
    }

    /// The scheduling loop of one execution
    async fn run_steps(self: &Arc<Self>, id: &str) -> Result<(), EngineError> {
        let started = self
            .tracker
            .update(id, |record| {
                if !record.start() {
                    return None;
                }
                record.push_log(format!(
                    "Execution {} of pipeline {} started",
                    record.id, record.pipeline_name
                ));
                Some((
                    record.pipeline_name.clone(),
                    record.steps.clone(),
                    record.metadata.clone(),
                ))
            })
            .await
            .flatten();

        let Some((pipeline_name, steps, metadata)) = started else {
            warn!("Execution {} is not pending, not running it", id);
            return Ok(());
        };

        info!("Starting pipeline execution: {} ({})", pipeline_name, id);
        self.events.emit(ExecutionEvent::ExecutionStarted {
            execution_id: id.to_string(),
            pipeline_name,
        });

        let semaphore = self
            .settings
            .strategy
            .limit()
            .map(|permits| Arc::new(Semaphore::new(permits)));
        let metadata = Arc::new(metadata);
        let mut scheduler = ExecutionScheduler::new();

        loop {
            if self.tracker.is_cancelled(id).await {
                info!("Execution {} was cancelled, leaving the scheduling loop", id);
                return Ok(());
            }

            let batch = match scheduler.next(&steps) {
                SchedulerDecision::Finished => return Ok(()),
                SchedulerDecision::Deadlocked { blocked } => {
                    error!("Execution {}: dependency deadlock on {:?}", id, blocked);
                    return Err(EngineError::DependencyGraph { blocked });
                }
                SchedulerDecision::Run(batch) => batch,
            };
            debug!("Execution {}: frontier {:?}", id, batch);

            let mut handles = Vec::with_capacity(batch.len());
            for name in batch {
                let Some(step) = steps.iter().find(|s| s.name == name).cloned() else {
                    continue;
                };
                handles.push((name, self.spawn_step(id, step, &metadata, &semaphore)));
            }

            let mut failure = None;
            for (name, handle) in handles {
                let result = handle.await.unwrap_or_else(|e| {
                    Err(StepError::Spawn {
                        step: name.clone(),
                        message: format!("step task failed: {}", e),
                    })
                });

                match result {
                    Ok(()) => scheduler.mark_completed(name),
                    Err(err) if steps.iter().any(|s| s.name == name && s.continue_on_error) => {
                        warn!("Step {} failed but continue_on_error is set: {}", name, err);
                        self.tracker
                            .log(
                                id,
                                format!(
                                    "Step {} failed but continue_on_error is set; marking completed",
                                    name
                                ),
                            )
                            .await;
                        self.events.emit(ExecutionEvent::StepSoftPassed {
                            execution_id: id.to_string(),
                            step: name.clone(),
                        });
                        scheduler.mark_completed(name);
                    }
                    Err(err) => {
                        if failure.is_none() {
                            failure = Some(err);
                        }
                    }
                }
            }

            if let Some(err) = failure {
                return Err(err.into());
            }
        }
    }

    fn spawn_step(
        self: &Arc<Self>,
        id: &str,
        mut step: Step,
        metadata: &Arc<HashMap<String, String>>,
        semaphore: &Option<Arc<Semaphore>>,
    ) -> JoinHandle<Result<(), StepError>> {
        let inner = Arc::clone(self);
        let id = id.to_string();
        let metadata = Arc::clone(metadata);
        let semaphore = semaphore.clone();

        tokio::spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            inner.runner.run(&id, &mut step, &metadata).await
        })
    }

    /// Finish the record; returns the error message when auto-heal should run
    async fn complete(&self, id: &str, result: Result<(), EngineError>) -> Option<String> {
        let (status, error) = match result {
            Ok(()) => (ExecutionStatus::Success, None),
            Err(e) => (ExecutionStatus::Failed, Some(e.to_string())),
        };
        let heal_requested = status == ExecutionStatus::Failed && self.settings.auto_heal;

        self.tracker
            .log(id, format!("Execution finished with status {}", status))
            .await;
        let finished = self
            .tracker
            .finish(
                id,
                status,
                error.clone(),
                heal_requested.then_some(HealState::InProgress),
            )
            .await;
        if !finished {
            debug!("Execution {} was already terminal", id);
            return None;
        }

        match &error {
            Some(message) => error!("Execution {} failed: {}", id, message),
            None => info!("Execution {} succeeded", id),
        }
        self.events.emit(ExecutionEvent::ExecutionFinished {
            execution_id: id.to_string(),
            status,
            error: error.clone(),
        });

        if heal_requested {
            error
        } else {
            None
        }
    }

    /// Auto-heal a failed execution; returns the id of the resubmission
    async fn heal(&self, id: &str, error_message: &str) -> Option<String> {
        let record = self.tracker.get(id).await?;
        let mut resubmitted = None;

        let outcome = match self.settings.max_heal_depth {
            Some(max) if record.heal_depth >= max => {
                warn!("Execution {}: heal depth limit {} reached", id, max);
                HealState::DepthLimitReached
            }
            _ => {
                let report = self.healer.heal(&record, error_message).await;
                let fixed = report.fix_applied();
                match report.pattern {
                    None => HealState::NoMatchingPattern,
                    Some(pattern) if !fixed => HealState::FixesFailed { pattern },
                    Some(pattern) => {
                        let new_id = format!("{}_retry_{}", id, Utc::now().timestamp_millis());
                        match self
                            .prepare(
                                &record.pipeline_name,
                                new_id.clone(),
                                record.metadata.clone(),
                                record.heal_depth + 1,
                            )
                            .await
                        {
                            Ok(()) => {
                                info!("Execution {} resubmitted as {} after auto-fix", id, new_id);
                                resubmitted = Some(new_id.clone());
                                HealState::Resubmitted {
                                    pattern,
                                    execution_id: new_id,
                                }
                            }
                            Err(e) => {
                                warn!("Execution {}: resubmission failed: {}", id, e);
                                HealState::ResubmitFailed {
                                    pattern,
                                    error: e.to_string(),
                                }
                            }
                        }
                    }
                }
            }
        };

        self.tracker.set_heal_state(id, outcome.clone()).await;
        self.events.emit(ExecutionEvent::HealFinished {
            execution_id: id.to_string(),
            outcome,
        });

        resubmitted
    }
}
