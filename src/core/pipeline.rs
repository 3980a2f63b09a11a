//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    step::{Step, StepDefaults},
};
use std::collections::HashSet;

/// A named pipeline definition
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Steps in definition order
    pub steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig, defaults: &StepDefaults) -> Self {
        let defaults = StepDefaults {
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
            timeout: config
                .default_timeout_secs
                .map(std::time::Duration::from_secs)
                .unwrap_or(defaults.timeout),
        };

        Pipeline {
            name: config.name.clone(),
            steps: config
                .steps
                .iter()
                .map(|step_config| Step::from_config(step_config, &defaults))
                .collect(),
        }
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Get a mutable step by name
    pub fn step_mut(&mut self, name: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    /// Names of steps that depend on a step that is not part of this pipeline
    pub fn dangling_dependencies(&self) -> Vec<(String, String)> {
        let names: HashSet<&str> = self.steps.iter().map(|s| s.name.as_str()).collect();
        self.steps
            .iter()
            .flat_map(|s| {
                s.dependencies
                    .iter()
                    .filter(|dep| !names.contains(dep.as_str()))
                    .map(move |dep| (s.name.clone(), dep.clone()))
            })
            .collect()
    }

    /// Whether the dependency graph contains a cycle
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();

        self.steps
            .iter()
            .any(|s| self.visit(&s.name, &mut visited, &mut stack))
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut HashSet<&'a str>,
    ) -> bool {
        if stack.contains(name) {
            return true;
        }
        if !visited.insert(name) {
            return false;
        }

        stack.insert(name);
        let cyclic = self.step(name).is_some_and(|step| {
            step.dependencies
                .iter()
                .any(|dep| self.visit(dep, visited, stack))
        });
        stack.remove(name);

        cyclic
    }
}
