//! Error taxonomy for the execution engine

use std::time::Duration;
use thiserror::Error;

/// Errors produced while running a single step
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    /// The command template references a key absent from the execution metadata
    #[error("Step '{step}' references missing placeholder '{{{key}}}'")]
    MissingPlaceholder { step: String, key: String },

    /// The process exited with a non-zero status
    #[error("Step '{step}' exited with code {exit_code}: {output}")]
    NonZeroExit {
        step: String,
        exit_code: i32,
        output: String,
    },

    /// The process could not be spawned or waited on
    #[error("Step '{step}' could not be executed: {message}")]
    Spawn { step: String, message: String },

    /// The process was killed after exceeding its timeout
    #[error("Step '{step}' timed out after {}s", .timeout.as_secs_f64())]
    Timeout { step: String, timeout: Duration },
}

impl StepError {
    /// Name of the step that produced this error
    pub fn step(&self) -> &str {
        match self {
            StepError::MissingPlaceholder { step, .. }
            | StepError::NonZeroExit { step, .. }
            | StepError::Spawn { step, .. }
            | StepError::Timeout { step, .. } => step,
        }
    }

    /// Whether a non-zero exit caused the failure (the only retryable case)
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::NonZeroExit { .. })
    }
}

/// Engine-level errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Unknown pipeline name passed to `execute`
    #[error("Pipeline '{0}' not found")]
    UnknownPipeline(String),

    /// Caller-supplied execution id is already tracked
    #[error("Execution '{0}' already exists")]
    DuplicateExecution(String),

    /// No executable frontier while steps remain incomplete
    #[error("Dependency graph cannot progress; never executable: {}", .blocked.join(", "))]
    DependencyGraph { blocked: Vec<String> },

    /// A step failed without `continue_on_error`
    #[error("Pipeline failed at step '{}': {source}", .source.step())]
    PipelineExecution {
        #[source]
        source: StepError,
    },
}

impl EngineError {
    /// Whether this error is raised synchronously to the caller of `execute`
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownPipeline(_) | EngineError::DuplicateExecution(_)
        )
    }
}

impl From<StepError> for EngineError {
    fn from(source: StepError) -> Self {
        EngineError::PipelineExecution { source }
    }
}
