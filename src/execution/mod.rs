//! Pipeline execution engine

pub mod engine;
pub mod events;
pub mod healer;
pub mod optimizer;
pub mod runner;
pub mod scheduler;
pub mod tracker;

pub use engine::Engine;
pub use events::{EventBus, EventHandler, ExecutionEvent};
pub use healer::{AutoHealer, HealReport};
pub use optimizer::{OptimizationSummary, Optimizer};
pub use runner::{backoff_delay, StepRunner};
pub use scheduler::{ExecutionScheduler, SchedulerDecision};
pub use tracker::{AggregateStats, ExecutionTracker};
