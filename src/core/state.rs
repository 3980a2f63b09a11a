//! Execution state models

use crate::core::step::Step;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Overall execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Submitted but not started
    Pending,
    /// Scheduling loop is running
    Running,
    /// Every step completed
    Success,
    /// A step failed or the graph deadlocked
    Failed,
    /// Engine stopped while the execution was running
    Cancelled,
    /// Not scheduled
    Skipped,
}

impl ExecutionStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        match self {
            ExecutionStatus::Pending => matches!(
                next,
                ExecutionStatus::Running
                    | ExecutionStatus::Skipped
                    | ExecutionStatus::Failed
                    | ExecutionStatus::Cancelled
            ),
            ExecutionStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Success => "Success",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Cancelled => "Cancelled",
            ExecutionStatus::Skipped => "Skipped",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ExecutionStatus::Pending),
            "Running" => Ok(ExecutionStatus::Running),
            "Success" => Ok(ExecutionStatus::Success),
            "Failed" => Ok(ExecutionStatus::Failed),
            "Cancelled" => Ok(ExecutionStatus::Cancelled),
            "Skipped" => Ok(ExecutionStatus::Skipped),
            other => Err(format!("Unknown execution status: {}", other)),
        }
    }
}

/// Outcome of auto-healing a failed execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HealState {
    /// Fix commands are being matched or run
    InProgress,
    /// No registered pattern matched the failure
    NoMatchingPattern,
    /// A pattern matched but none of its fix commands succeeded
    FixesFailed { pattern: String },
    /// The configured heal depth cap stopped the chain
    DepthLimitReached,
    /// Fixes applied and the pipeline was resubmitted
    Resubmitted { pattern: String, execution_id: String },
    /// Fixes applied but resubmission was rejected
    ResubmitFailed { pattern: String, error: String },
}

impl HealState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, HealState::InProgress)
    }
}

/// One run of a pipeline with given parameters
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub id: String,
    pub pipeline_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Private copy of the pipeline's steps
    pub steps: Vec<Step>,

    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub logs: Vec<String>,

    /// Execution parameters, reused verbatim by auto-heal resubmissions
    pub metadata: HashMap<String, String>,

    /// 0 for caller submissions, parent + 1 for auto-heal resubmissions
    pub heal_depth: u32,

    /// Auto-heal outcome, set once the execution failed with healing enabled
    pub heal: Option<HealState>,
}

impl ExecutionRecord {
    pub fn new(
        id: impl Into<String>,
        pipeline_name: impl Into<String>,
        steps: Vec<Step>,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: id.into(),
            pipeline_name: pipeline_name.into(),
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            steps,
            current_step: None,
            error_message: None,
            logs: Vec::new(),
            metadata,
            heal_depth: 0,
            heal: None,
        }
    }

    /// Append a timestamped log line; ignored once the record is terminal
    pub fn push_log(&mut self, message: impl AsRef<str>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.logs.push(format!(
            "[{}] {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            message.as_ref()
        ));
        true
    }

    /// Mark the execution as running
    pub fn start(&mut self) -> bool {
        if !self.status.can_transition_to(ExecutionStatus::Running) {
            return false;
        }
        self.status = ExecutionStatus::Running;
        self.started_at = Utc::now();
        true
    }

    /// Move to a terminal status, recording the end time
    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>) -> bool {
        if !status.is_terminal() || !self.status.can_transition_to(status) {
            return false;
        }
        self.status = status;
        self.error_message = error;
        self.ended_at = Some(Utc::now());
        true
    }

    /// Wall-clock duration, if the execution ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }

    /// Mutable access to the private copy of a step
    pub fn step_mut(&mut self, name: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    /// Status report returned to pollers
    pub fn report(&self) -> StatusReport {
        StatusReport {
            id: self.id.clone(),
            pipeline_name: self.pipeline_name.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            current_step: self.current_step.clone(),
            error_message: self.error_message.clone(),
            steps_total: self.steps.len(),
            metadata: self.metadata.clone(),
            heal_depth: self.heal_depth,
            heal: self.heal.clone(),
        }
    }

    /// Compact summary used by listings and the history store
    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            execution_id: self.id.clone(),
            pipeline_name: self.pipeline_name.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            steps_total: self.steps.len(),
            error_message: self.error_message.clone(),
        }
    }
}

/// Summary of a pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub pipeline_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub steps_total: usize,
    pub error_message: Option<String>,
}

/// Snapshot of an execution for `GetStatus`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub id: String,
    pub pipeline_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub steps_total: usize,
    pub metadata: HashMap<String, String>,
    pub heal_depth: u32,
    pub heal: Option<HealState>,
}
