//! Execution events delivered to subscribers (e.g. the CLI)

use crate::core::{ExecutionStatus, HealState};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: String,
        pipeline_name: String,
    },
    StepStarted {
        execution_id: String,
        step: String,
        attempt: u32,
    },
    StepRetrying {
        execution_id: String,
        step: String,
        retry: u32,
        max_retries: u32,
        delay: Duration,
    },
    StepCompleted {
        execution_id: String,
        step: String,
    },
    StepFailed {
        execution_id: String,
        step: String,
        error: String,
    },
    StepSoftPassed {
        execution_id: String,
        step: String,
    },
    ExecutionFinished {
        execution_id: String,
        status: ExecutionStatus,
        error: Option<String>,
    },
    HealFinished {
        execution_id: String,
        outcome: HealState,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of events to registered handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.handlers.read().map(|h| h.len()).unwrap_or_default();
        f.debug_struct("EventBus").field("handlers", &count).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event handler
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.push(Arc::new(handler));
        }
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers {
            handler(event.clone());
        }
    }
}
