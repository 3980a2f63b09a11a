//! Execution scheduler - determines which steps to run next

use crate::core::Step;
use std::collections::HashSet;

/// What the execution loop should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerDecision {
    /// Run these steps concurrently (definition order)
    Run(Vec<String>),

    /// Every step completed
    Finished,

    /// Steps remain but none can start; lists every step that never ran
    Deadlocked { blocked: Vec<String> },
}

/// Tracks completed steps of one execution and computes its frontier
#[derive(Debug, Default)]
pub struct ExecutionScheduler {
    completed: HashSet<String>,
}

impl ExecutionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step as completed, whether it succeeded or soft-passed
    pub fn mark_completed(&mut self, step: impl Into<String>) {
        self.completed.insert(step.into());
    }

    /// Whether `step` counts as satisfied for its dependents
    pub fn is_satisfied(&self, step: &str) -> bool {
        self.completed.contains(step)
    }

    /// Steps not yet completed whose dependencies have all completed
    pub fn frontier<'a>(&self, steps: &'a [Step]) -> Vec<&'a Step> {
        steps
            .iter()
            .filter(|s| !self.is_satisfied(&s.name))
            .filter(|s| s.dependencies_satisfied(&self.completed))
            .collect()
    }

    /// Steps that have not completed, in definition order
    pub fn remaining(&self, steps: &[Step]) -> Vec<String> {
        steps
            .iter()
            .filter(|s| !self.is_satisfied(&s.name))
            .map(|s| s.name.clone())
            .collect()
    }

    /// Get the next scheduling decision
    pub fn next(&self, steps: &[Step]) -> SchedulerDecision {
        let remaining = self.remaining(steps);
        if remaining.is_empty() {
            return SchedulerDecision::Finished;
        }

        let frontier = self.frontier(steps);
        if frontier.is_empty() {
            return SchedulerDecision::Deadlocked { blocked: remaining };
        }

        SchedulerDecision::Run(frontier.into_iter().map(|s| s.name.clone()).collect())
    }
}
