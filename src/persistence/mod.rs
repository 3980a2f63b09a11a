//! Persistence layer for execution history
//!
//! The engine itself keeps everything in memory; this layer lets the CLI
//! keep summaries of finished runs across invocations.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::{ExecutionStatus, ExecutionSummary};
use anyhow::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save (or overwrite) an execution summary
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load an execution by ID
    async fn load_execution(&self, execution_id: &str) -> Result<Option<ExecutionSummary>>;

    /// List all executions for a pipeline, most recent first
    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// Most recent executions across all pipelines
    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionSummary>>;

    /// List all pipeline names with recorded history
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<String, ExecutionSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut summaries: Vec<ExecutionSummary>) -> Vec<ExecutionSummary> {
    summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    summaries
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.execution_id.clone(), execution.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: &str) -> Result<Option<ExecutionSummary>> {
        Ok(self.executions.read().await.get(execution_id).cloned())
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(newest_first(
            execs
                .values()
                .filter(|e| e.pipeline_name == pipeline_name)
                .cloned()
                .collect(),
        ))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionSummary>> {
        let mut all = newest_first(self.executions.read().await.values().cloned().collect());
        all.truncate(limit);
        Ok(all)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let execs = self.executions.read().await;
        let mut names: Vec<String> = execs.values().map(|e| e.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
