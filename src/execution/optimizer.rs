//! Optimization loop - tunes frequently failing steps and evicts old records

use crate::{
    core::{config::EngineSettings, PipelineCatalog, StepTuning},
    execution::tracker::ExecutionTracker,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Result of one optimization pass
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationSummary {
    pub ran_at: DateTime<Utc>,

    /// Failure tally per step name within the failure window
    pub failure_counts: BTreeMap<String, usize>,

    /// Catalog changes made by this pass
    pub tuned: Vec<StepTuning>,

    /// Records deleted by retention cleanup
    pub removed_executions: usize,

    /// Increment applied to `optimizations_performed`
    pub optimizations: u64,
}

/// Periodic self-tuning and cleanup
pub struct Optimizer {
    catalog: Arc<PipelineCatalog>,
    tracker: Arc<ExecutionTracker>,
    settings: EngineSettings,
}

impl Optimizer {
    pub fn new(
        catalog: Arc<PipelineCatalog>,
        tracker: Arc<ExecutionTracker>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            catalog,
            tracker,
            settings,
        }
    }

    /// Count, per step name, the failed executions within the window in
    /// which that step needed at least one retry
    pub async fn failure_counts(&self, now: DateTime<Utc>) -> BTreeMap<String, usize> {
        let since = now - self.settings.failure_window();
        let mut counts = BTreeMap::new();

        for record in self.tracker.failed_since(since).await {
            for step in record.steps.iter().filter(|s| s.retry_count > 0) {
                *counts.entry(step.name.clone()).or_insert(0) += 1;
            }
        }

        counts
    }

    /// Run one tuning + cleanup pass as of `now`
    pub async fn run_pass(&self, now: DateTime<Utc>) -> OptimizationSummary {
        let failure_counts = self.failure_counts(now).await;
        let mut tuned = Vec::new();
        let mut optimizations = 0u64;

        let multiplier = self.settings.timeout_multiplier;
        let max_timeout = self.settings.max_timeout();
        let retries_cap = self.settings.max_retries_cap;

        for (name, count) in &failure_counts {
            if *count < self.settings.tuning_threshold {
                continue;
            }

            let changes: Vec<StepTuning> = self
                .catalog
                .tune_step(name, |step| {
                    // Limits configured above the caps are pulled down to them.
                    step.timeout = scaled_timeout(step.timeout, multiplier, max_timeout);
                    step.max_retries = step.max_retries.saturating_add(1).min(retries_cap);
                })
                .await
                .into_iter()
                .filter(|t| {
                    t.new_timeout_secs != t.old_timeout_secs
                        || t.new_max_retries != t.old_max_retries
                })
                .collect();

            if changes.is_empty() {
                debug!("Step {} failed {} times but is already at its caps", name, count);
                continue;
            }

            info!(
                "Tuned step {} after {} recent failures ({} pipeline(s))",
                name,
                count,
                changes.len()
            );
            optimizations += 1;
            tuned.extend(changes);
        }

        let removed_executions = self
            .tracker
            .remove_ended_before(now - self.settings.retention())
            .await;
        if removed_executions > 0 {
            info!("Removed {} expired execution record(s)", removed_executions);
            optimizations += 1;
        }

        if optimizations > 0 {
            self.tracker.record_optimizations(optimizations).await;
        }

        OptimizationSummary {
            ran_at: now,
            failure_counts,
            tuned,
            removed_executions,
            optimizations,
        }
    }

    /// Spawn the periodic loop; the first pass runs one interval from now
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.settings.optimization_interval();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let summary = self.run_pass(Utc::now()).await;
                debug!(
                    "Optimization pass: {} tuning(s), {} record(s) removed",
                    summary.tuned.len(),
                    summary.removed_executions
                );
            }
        })
    }
}

/// `timeout * multiplier`, capped; a product too large for a `Duration` is
/// treated as exceeding the cap
fn scaled_timeout(timeout: Duration, multiplier: f64, cap: Duration) -> Duration {
    Duration::try_from_secs_f64(timeout.as_secs_f64() * multiplier).map_or(cap, |t| t.min(cap))
}
