//! Test utilities for pipeline-engine scenarios
#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_engine::core::config::EngineSettings;
use pipeline_engine::process::{ProcessError, ProcessExecutor, ProcessOutput, ProcessRequest};
use pipeline_engine::{
    Engine, ErrorPatternRegistry, HealState, Pipeline, PipelineCatalog, StatusReport,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound for any wait in the scenarios
pub const WAIT: Duration = Duration::from_secs(10);

/// Scripted result of one fake process run
#[derive(Debug, Clone)]
pub struct Script {
    pub exit_code: i32,
    pub output: String,
    pub delay: Duration,
    pub timeout: bool,
}

impl Script {
    pub fn ok() -> Self {
        Self {
            exit_code: 0,
            output: String::new(),
            delay: Duration::ZERO,
            timeout: false,
        }
    }

    pub fn fail(exit_code: i32, output: &str) -> Self {
        Self {
            exit_code,
            output: output.to_string(),
            ..Self::ok()
        }
    }

    /// Report a timeout instead of an exit code
    pub fn timeout() -> Self {
        Self {
            timeout: true,
            ..Self::ok()
        }
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One recorded process run
#[derive(Debug, Clone)]
pub struct Call {
    pub command: String,
    pub env: HashMap<String, String>,
    pub started: Instant,
    pub finished: Instant,
}

/// Fake subprocess layer.
///
/// Commands without a script succeed immediately. A scripted command
/// consumes its scripts in order and keeps repeating the last one.
#[derive(Default)]
pub struct FakeExecutor {
    scripts: Mutex<HashMap<String, Vec<Script>>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Always answer `command` with `script`
    pub fn on(self: &Arc<Self>, command: &str, script: Script) -> Arc<Self> {
        self.on_sequence(command, vec![script])
    }

    pub fn on_sequence(self: &Arc<Self>, command: &str, scripts: Vec<Script>) -> Arc<Self> {
        self.scripts
            .lock()
            .unwrap()
            .insert(command.to_string(), scripts);
        Arc::clone(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, command: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.command == command)
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls_for(command).len()
    }

    fn next_script(&self, command: &str) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) => queue.first().cloned().unwrap_or_else(Script::ok),
            None => Script::ok(),
        }
    }
}

#[async_trait]
impl ProcessExecutor for FakeExecutor {
    async fn run(
        &self,
        request: &ProcessRequest,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        let script = self.next_script(&request.command);
        let started = Instant::now();
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        self.calls.lock().unwrap().push(Call {
            command: request.command.clone(),
            env: request.env.clone(),
            started,
            finished: Instant::now(),
        });

        if script.timeout {
            return Err(ProcessError::Timeout(timeout));
        }
        Ok(ProcessOutput::new(script.exit_code, &script.output))
    }
}

/// Settings with a 1ms backoff unit so retries are fast
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        backoff_unit_ms: 1,
        ..EngineSettings::default()
    }
}

pub fn engine_with(
    pipelines: Vec<Pipeline>,
    settings: EngineSettings,
    executor: &Arc<FakeExecutor>,
) -> Engine<Arc<FakeExecutor>> {
    Engine::new(
        PipelineCatalog::with_pipelines(pipelines),
        ErrorPatternRegistry::with_defaults(),
        settings,
        Arc::clone(executor),
    )
}

/// Submit a pipeline and wait until it is terminal and healing settled
pub async fn run_to_end(
    engine: &Engine<Arc<FakeExecutor>>,
    pipeline: &str,
    params: HashMap<String, String>,
) -> StatusReport {
    let id = engine
        .execute(pipeline, None, params)
        .await
        .expect("pipeline should be accepted");
    engine
        .wait_until_settled(&id, WAIT)
        .await
        .expect("execution should settle")
}

/// Follow auto-heal resubmissions starting at `id`
pub async fn follow_heal_chain(engine: &Engine<Arc<FakeExecutor>>, id: &str) -> Vec<StatusReport> {
    let mut chain = Vec::new();
    let mut current = id.to_string();
    loop {
        let report = engine
            .wait_until_settled(&current, WAIT)
            .await
            .expect("execution should settle");
        chain.push(report.clone());
        match report.heal {
            Some(HealState::Resubmitted { execution_id, .. }) => current = execution_id,
            _ => return chain,
        }
    }
}

pub fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Assert some log line contains `needle`
pub fn assert_log_contains(logs: &[String], needle: &str) {
    assert!(
        logs.iter().any(|line| line.contains(needle)),
        "no log line contains {:?}; logs:\n{}",
        needle,
        logs.join("\n")
    );
}

/// Assert `first` finished before `second` started
pub fn assert_ran_before(executor: &FakeExecutor, first: &str, second: &str) {
    let first_calls = executor.calls_for(first);
    let second_calls = executor.calls_for(second);
    let (Some(a), Some(b)) = (first_calls.last(), second_calls.first()) else {
        panic!("{} or {} never ran", first, second);
    };
    assert!(
        a.finished <= b.started,
        "{} should finish before {} starts",
        first,
        second
    );
}
