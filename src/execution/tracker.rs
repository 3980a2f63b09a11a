//! Execution tracker - owns execution records, their logs and rolling statistics

use crate::core::{
    EngineError, ExecutionRecord, ExecutionStatus, ExecutionSummary, HealState, StatusReport,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Smoothing factor of the rolling average duration
const DURATION_EMA_ALPHA: f64 = 0.1;

/// Engine-wide counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub auto_fixes_applied: u64,
    pub optimizations_performed: u64,
    pub last_execution: Option<DateTime<Utc>>,

    /// Exponential moving average of execution duration, in seconds
    pub average_duration_secs: Option<f64>,
}

impl AggregateStats {
    /// Account for a finished execution
    pub fn record_execution(
        &mut self,
        status: ExecutionStatus,
        duration_secs: f64,
        at: DateTime<Utc>,
    ) {
        self.total_executions += 1;
        match status {
            ExecutionStatus::Success => self.successful_executions += 1,
            ExecutionStatus::Failed => self.failed_executions += 1,
            _ => {}
        }
        self.last_execution = Some(at);
        self.average_duration_secs = Some(match self.average_duration_secs {
            None => duration_secs,
            Some(avg) => DURATION_EMA_ALPHA * duration_secs + (1.0 - DURATION_EMA_ALPHA) * avg,
        });
    }

    /// Fraction of finished executions that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        self.successful_executions as f64 / self.total_executions as f64
    }
}

/// Store of execution records.
///
/// Records are only mutated through this type so that concurrent steps of
/// one execution never race on its logs or step copies.
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    records: RwLock<HashMap<String, ExecutionRecord>>,
    stats: Mutex<AggregateStats>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new record; ids must be unique
    pub async fn insert(&self, record: ExecutionRecord) -> Result<(), EngineError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(EngineError::DuplicateExecution(record.id));
        }
        debug!("Tracking execution {}", record.id);
        records.insert(record.id.clone(), record);
        Ok(())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.records.read().await.contains_key(id)
    }

    /// Clone of a record
    pub async fn get(&self, id: &str) -> Option<ExecutionRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Run `f` against a record under the write lock
    pub async fn update<F, R>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut ExecutionRecord) -> R,
    {
        self.records.write().await.get_mut(id).map(f)
    }

    /// Append a log line to a record
    pub async fn log(&self, id: &str, message: impl AsRef<str>) {
        self.update(id, |record| record.push_log(message)).await;
    }

    pub async fn status(&self, id: &str) -> Option<StatusReport> {
        self.records.read().await.get(id).map(ExecutionRecord::report)
    }

    pub async fn logs(&self, id: &str) -> Option<Vec<String>> {
        self.records.read().await.get(id).map(|r| r.logs.clone())
    }

    pub async fn is_cancelled(&self, id: &str) -> bool {
        self.records
            .read()
            .await
            .get(id)
            .is_some_and(|r| r.status == ExecutionStatus::Cancelled)
    }

    /// Most recent executions first
    pub async fn list(&self, limit: usize) -> Vec<ExecutionSummary> {
        let records = self.records.read().await;
        let mut summaries: Vec<ExecutionSummary> =
            records.values().map(ExecutionRecord::summary).collect();
        summaries.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.execution_id.cmp(&a.execution_id))
        });
        summaries.truncate(limit);
        summaries
    }

    /// Move a record to a terminal status and fold it into the statistics.
    ///
    /// Returns `false` if the record was already terminal (e.g. cancelled).
    pub async fn finish(
        &self,
        id: &str,
        status: ExecutionStatus,
        error: Option<String>,
        heal: Option<HealState>,
    ) -> bool {
        let finished = self
            .update(id, |record| {
                if !record.finish(status, error) {
                    return None;
                }
                record.heal = heal;
                Some(record.duration())
            })
            .await
            .flatten();

        let Some(duration) = finished else {
            return false;
        };

        let secs = duration
            .and_then(|d| d.to_std().ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        self.stats
            .lock()
            .await
            .record_execution(status, secs, Utc::now());
        true
    }

    /// Record the auto-heal outcome of a failed execution
    pub async fn set_heal_state(&self, id: &str, state: HealState) {
        self.update(id, |record| record.heal = Some(state)).await;
    }

    /// Mark every running record as cancelled, returning their ids.
    ///
    /// Cancelled executions count towards `total_executions` but neither
    /// successes nor failures.
    pub async fn cancel_running(&self) -> Vec<String> {
        let mut cancelled = Vec::new();
        {
            let mut records = self.records.write().await;
            for record in records.values_mut() {
                if record.status != ExecutionStatus::Running {
                    continue;
                }
                record.push_log("Execution cancelled: engine stopping");
                if record.finish(ExecutionStatus::Cancelled, Some("Engine stopped".to_string())) {
                    let secs = record
                        .duration()
                        .and_then(|d| d.to_std().ok())
                        .map(|d| d.as_secs_f64())
                        .unwrap_or_default();
                    cancelled.push((record.id.clone(), secs));
                }
            }
        }

        let mut stats = self.stats.lock().await;
        let now = Utc::now();
        cancelled
            .into_iter()
            .map(|(id, secs)| {
                stats.record_execution(ExecutionStatus::Cancelled, secs, now);
                id
            })
            .collect()
    }

    /// Failed records whose end time is at or after `since`
    pub async fn failed_since(&self, since: DateTime<Utc>) -> Vec<ExecutionRecord> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.status == ExecutionStatus::Failed)
            .filter(|r| r.ended_at.is_some_and(|end| end >= since))
            .cloned()
            .collect()
    }

    /// Delete records that ended before `cutoff`; running records are kept
    pub async fn remove_ended_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.ended_at.map_or(true, |end| end >= cutoff));
        before - records.len()
    }

    pub async fn stats(&self) -> AggregateStats {
        self.stats.lock().await.clone()
    }

    pub async fn record_auto_fix(&self) {
        self.stats.lock().await.auto_fixes_applied += 1;
    }

    pub async fn record_optimizations(&self, count: u64) {
        self.stats.lock().await.optimizations_performed += count;
    }
}
