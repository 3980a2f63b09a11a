//! Pipeline catalog - the shared, runtime-tunable set of pipeline definitions

use crate::core::{pipeline::Pipeline, step::Step};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Catalog of named pipeline definitions.
///
/// Every read hands out a deep copy; the only writer after construction is
/// the optimizer's tuning pass, serialized by the lock.
#[derive(Debug, Default)]
pub struct PipelineCatalog {
    pipelines: RwLock<HashMap<String, Pipeline>>,
}

/// Before/after limits of a tuned step in one pipeline
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StepTuning {
    pub pipeline: String,
    pub step: String,
    pub old_timeout_secs: f64,
    pub new_timeout_secs: f64,
    pub old_max_retries: u32,
    pub new_max_retries: u32,
}

impl PipelineCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a list of pipelines
    pub fn with_pipelines(pipelines: impl IntoIterator<Item = Pipeline>) -> Self {
        let map = pipelines
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self {
            pipelines: RwLock::new(map),
        }
    }

    /// Deep copy of a pipeline definition
    pub async fn get(&self, name: &str) -> Option<Pipeline> {
        self.pipelines.read().await.get(name).cloned()
    }

    /// Pipeline names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pipelines.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Apply `tune` to every step named `step_name` in every pipeline
    pub async fn tune_step<F>(&self, step_name: &str, mut tune: F) -> Vec<StepTuning>
    where
        F: FnMut(&mut Step),
    {
        let mut pipelines = self.pipelines.write().await;
        let mut tunings = Vec::new();

        for pipeline in pipelines.values_mut() {
            let pipeline_name = pipeline.name.clone();
            for step in pipeline.steps.iter_mut().filter(|s| s.name == step_name) {
                let (old_timeout, old_retries) = (step.timeout, step.max_retries);
                tune(step);
                tunings.push(StepTuning {
                    pipeline: pipeline_name.clone(),
                    step: step.name.clone(),
                    old_timeout_secs: old_timeout.as_secs_f64(),
                    new_timeout_secs: step.timeout.as_secs_f64(),
                    old_max_retries: old_retries,
                    new_max_retries: step.max_retries,
                });
            }
        }

        tunings
    }
}
