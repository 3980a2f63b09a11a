//! Engine configuration from YAML

use crate::core::{
    catalog::PipelineCatalog,
    patterns::{ErrorPattern, ErrorPatternRegistry},
    pipeline::Pipeline,
    step::{StepDefaults, StepStage},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Top-level engine configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Engine tuning knobs
    #[serde(default)]
    pub settings: EngineSettings,

    /// Pipeline definitions
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,

    /// Extra error patterns, registered after the built-in ones
    #[serde(default)]
    pub error_patterns: Vec<ErrorPattern>,

    /// Whether to register the built-in error patterns
    #[serde(default = "default_true")]
    pub default_patterns: bool,
}

/// Pipeline configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Pipeline steps
    pub steps: Vec<StepConfig>,

    /// Maximum number of retries per step (pipeline default)
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name, unique within the pipeline
    pub name: String,

    /// Stage the step belongs to
    #[serde(default)]
    pub stage: StepStage,

    /// Command template
    pub command: String,

    /// Steps this step depends on
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Maximum retries for this step (overrides pipeline default)
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Timeout for this step (overrides pipeline default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Environment overrides
    #[serde(default)]
    pub environment: HashMap<String, String>,

    /// Working directory
    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    /// Soft-pass failures so dependents still run
    #[serde(default)]
    pub continue_on_error: bool,
}

/// How many frontier steps may run at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStrategy {
    /// One step at a time, in definition order
    Sequential,

    /// The whole frontier at once
    #[default]
    Parallel,

    /// At most N concurrent steps
    LimitedParallel(usize),
}

impl SchedulingStrategy {
    /// Concurrency limit, `None` meaning unbounded
    pub fn limit(&self) -> Option<usize> {
        match self {
            SchedulingStrategy::Sequential => Some(1),
            SchedulingStrategy::Parallel => None,
            SchedulingStrategy::LimitedParallel(max) => Some((*max).max(1)),
        }
    }
}

/// Engine tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Run the auto-healer on failed executions
    pub auto_heal: bool,

    /// Frontier concurrency
    pub strategy: SchedulingStrategy,

    /// Retry backoff unit; attempt n sleeps `2^n` units
    pub backoff_unit_ms: u64,

    /// Optimizer tick interval
    pub optimization_interval_secs: u64,

    /// Records older than this are removed by the optimizer
    pub retention_secs: u64,

    /// Failures older than this are ignored by the tuner
    pub failure_window_secs: u64,

    /// Failures of a step name before it gets tuned
    pub tuning_threshold: usize,

    pub timeout_multiplier: f64,
    pub max_timeout_secs: u64,
    pub max_retries_cap: u32,

    /// Defaults for steps without explicit limits
    pub default_max_retries: u32,
    pub default_timeout_secs: u64,

    /// Timeout for each auto-heal fix command
    pub fix_timeout_secs: u64,

    /// Hard cap on attempts per step per execution (unbounded when unset)
    pub max_step_attempts: Option<u32>,

    /// Hard cap on chained auto-heal resubmissions (unbounded when unset)
    pub max_heal_depth: Option<u32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            auto_heal: true,
            strategy: SchedulingStrategy::Parallel,
            backoff_unit_ms: 1000,
            optimization_interval_secs: 300,
            retention_secs: 7 * 24 * 3600,
            failure_window_secs: 24 * 3600,
            tuning_threshold: 3,
            timeout_multiplier: 1.5,
            max_timeout_secs: 1800,
            max_retries_cap: 5,
            default_max_retries: 2,
            default_timeout_secs: 300,
            fix_timeout_secs: 300,
            max_step_attempts: None,
            max_heal_depth: None,
        }
    }
}

impl EngineSettings {
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn optimization_interval(&self) -> Duration {
        Duration::from_secs(self.optimization_interval_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_secs as i64)
    }

    pub fn failure_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.failure_window_secs as i64)
    }

    pub fn fix_timeout(&self) -> Duration {
        Duration::from_secs(self.fix_timeout_secs)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout_secs)
    }

    pub fn step_defaults(&self) -> StepDefaults {
        StepDefaults {
            max_retries: self.default_max_retries,
            timeout: Duration::from_secs(self.default_timeout_secs),
        }
    }
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Load engine configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse engine configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Dangling dependencies and cycles are only warned about: the scheduler
    /// reports them as a dependency deadlock at run time.
    pub fn validate(&self) -> Result<()> {
        let mut seen_pipelines = HashSet::new();
        for pipeline in &self.pipelines {
            if !seen_pipelines.insert(&pipeline.name) {
                anyhow::bail!("Duplicate pipeline name: {}", pipeline.name);
            }
            pipeline.validate()?;
        }

        for pattern in &self.error_patterns {
            if pattern.keywords.is_empty() {
                anyhow::bail!("Error pattern '{}' has no keywords", pattern.name);
            }
        }

        let multiplier = self.settings.timeout_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            anyhow::bail!(
                "timeout_multiplier must be a finite number of at least 1.0, got {}",
                multiplier
            );
        }

        for pipeline in self.to_pipelines() {
            for (step, dep) in pipeline.dangling_dependencies() {
                warn!(
                    "Pipeline '{}': step '{}' depends on unknown step '{}'",
                    pipeline.name, step, dep
                );
            }
            if pipeline.has_cycle() {
                warn!("Pipeline '{}' has a dependency cycle", pipeline.name);
            }
        }

        Ok(())
    }

    /// Convert pipeline configs into domain pipelines
    pub fn to_pipelines(&self) -> Vec<Pipeline> {
        let defaults = self.settings.step_defaults();
        self.pipelines
            .iter()
            .map(|p| Pipeline::from_config(p, &defaults))
            .collect()
    }

    /// Build the pipeline catalog
    pub fn to_catalog(&self) -> PipelineCatalog {
        PipelineCatalog::with_pipelines(self.to_pipelines())
    }

    /// Build the error pattern registry
    pub fn to_registry(&self) -> ErrorPatternRegistry {
        let mut registry = if self.default_patterns {
            ErrorPatternRegistry::with_defaults()
        } else {
            ErrorPatternRegistry::new()
        };
        for pattern in &self.error_patterns {
            registry.register(pattern.clone());
        }
        registry
    }
}

impl PipelineConfig {
    /// Validate a single pipeline definition
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(&step.name) {
                anyhow::bail!("Pipeline '{}': duplicate step name: {}", self.name, step.name);
            }
            if step.depends_on.contains(&step.name) {
                anyhow::bail!(
                    "Pipeline '{}': step '{}' depends on itself",
                    self.name,
                    step.name
                );
            }
        }
        Ok(())
    }
}
