//! Step domain model

use crate::core::{config::StepConfig, error::StepError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Pipeline stage a step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStage {
    Setup,
    #[default]
    Build,
    Test,
    SecurityScan,
    Deploy,
    Monitor,
    Cleanup,
}

/// A single step in a pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// Step name, unique within its pipeline
    pub name: String,

    /// Stage the step belongs to
    pub stage: StepStage,

    /// Command template with `{key}` placeholders
    pub command: String,

    /// Hard limit for a single attempt
    pub timeout: Duration,

    /// Retries consumed so far in the owning execution
    pub retry_count: u32,

    /// Maximum number of retries after the first attempt
    pub max_retries: u32,

    /// Names of steps that must complete first
    pub dependencies: Vec<String>,

    /// Environment overrides merged over the ambient environment
    pub environment: HashMap<String, String>,

    /// Working directory (defaults to the engine's current directory)
    pub working_directory: Option<PathBuf>,

    /// Treat a failure as completion so dependents still run
    pub continue_on_error: bool,
}

/// Defaults applied to steps that don't set their own limits
#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub max_retries: u32,
    pub timeout: Duration,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout: Duration::from_secs(300), // 5 minutes
        }
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"(\$?)\{([A-Za-z_][A-Za-z0-9_.\-]*)\}").expect("placeholder regex is valid")
    })
}

impl Step {
    /// Create a step with default limits and no dependencies
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        let defaults = StepDefaults::default();
        Self {
            name: name.into(),
            stage: StepStage::default(),
            command: command.into(),
            timeout: defaults.timeout,
            retry_count: 0,
            max_retries: defaults.max_retries,
            dependencies: Vec::new(),
            environment: HashMap::new(),
            working_directory: None,
            continue_on_error: false,
        }
    }

    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Self {
        Step {
            name: config.name.clone(),
            stage: config.stage,
            command: config.command.clone(),
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            retry_count: 0,
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
            dependencies: config.depends_on.clone(),
            environment: config.environment.clone(),
            working_directory: config.working_directory.clone(),
            continue_on_error: config.continue_on_error,
        }
    }

    pub fn with_stage(mut self, stage: StepStage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    /// Check if all dependencies are satisfied.
    ///
    /// A dependency counts as satisfied once it is in `completed`, whatever
    /// its outcome was: a soft-passed step unblocks its dependents.
    pub fn dependencies_satisfied(&self, completed: &HashSet<String>) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// Render the command, substituting `{key}` placeholders from `metadata`.
    ///
    /// `${VAR}` is shell syntax and is left untouched.
    pub fn render_command(&self, metadata: &HashMap<String, String>) -> Result<String, StepError> {
        let mut rendered = String::with_capacity(self.command.len());
        let mut last = 0;

        for caps in placeholder_regex().captures_iter(&self.command) {
            let Some(whole) = caps.get(0) else { continue };
            if !caps[1].is_empty() {
                continue;
            }

            let key = &caps[2];
            let value = metadata.get(key).ok_or_else(|| StepError::MissingPlaceholder {
                step: self.name.clone(),
                key: key.to_string(),
            })?;

            rendered.push_str(&self.command[last..whole.start()]);
            rendered.push_str(value);
            last = whole.end();
        }

        rendered.push_str(&self.command[last..]);
        Ok(rendered)
    }

    /// Merge the ambient environment with this step's overrides
    pub fn merged_environment<I>(&self, ambient: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env: HashMap<String, String> = ambient.into_iter().collect();
        env.extend(self.environment.clone());
        env
    }

    /// Whether another retry is allowed
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
