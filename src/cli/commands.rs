//! CLI command definitions

use crate::core::config::SchedulingStrategy;
use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Name of the pipeline to run
    pub pipeline: String,

    /// Execution parameters for command placeholders (key=value)
    #[arg(short, long, value_parser = parse_key_value)]
    pub param: Vec<(String, String)>,

    /// Execution id (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,

    /// Override the configured scheduling strategy
    #[arg(long, value_enum)]
    pub strategy: Option<SchedulingStrategyArg>,

    /// Concurrency limit for `--strategy parallel-limited`
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Disable auto-healing for this run
    #[arg(long)]
    pub no_heal: bool,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,

    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 3600)]
    pub wait_secs: u64,

    /// Print execution logs even on success
    #[arg(long)]
    pub logs: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate the engine configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List configured pipelines
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show steps and their dependencies
    #[arg(long)]
    pub steps: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific execution
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl SchedulingStrategyArg {
    pub fn to_strategy(self, max_parallel: usize) -> SchedulingStrategy {
        match self {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => {
                SchedulingStrategy::LimitedParallel(max_parallel)
            }
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
