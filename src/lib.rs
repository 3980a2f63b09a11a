//! pipeline-engine - a self-healing CI/CD pipeline execution engine

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod process;

// Re-export commonly used types
pub use core::config::{EngineConfig, EngineSettings, SchedulingStrategy};
pub use core::{
    EngineError, ErrorPattern, ErrorPatternRegistry, ExecutionRecord, ExecutionStatus,
    ExecutionSummary, HealState, Pipeline, PipelineCatalog, StatusReport, Step, StepError,
    StepStage,
};
pub use execution::{AggregateStats, Engine, ExecutionEvent, OptimizationSummary};
pub use process::{ProcessExecutor, ProcessOutput, ProcessRequest, ShellExecutor};
