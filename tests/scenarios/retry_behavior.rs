//! Test: Retry Behavior - exponential backoff on non-zero exits

use crate::helpers::*;
use pipeline_engine::{EngineSettings, ExecutionStatus, Pipeline, Step};
use std::collections::HashMap;
use std::time::Duration;

/// A step with max_retries=2 that always fails runs exactly 3 times
#[tokio::test]
async fn test_retries_exhausted() {
    let executor = FakeExecutor::new().on("make test", Script::fail(2, "1 test failed"));
    let pipeline = Pipeline::new(
        "ci",
        vec![Step::new("unit_tests", "make test").with_max_retries(2)],
    );
    let engine = engine_with(vec![pipeline], fast_settings(), &executor);

    let report = run_to_end(&engine, "ci", HashMap::new()).await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(executor.count("make test"), 3);

    let record = engine.tracker().get(&report.id).await.unwrap();
    assert_eq!(record.steps[0].retry_count, 2);

    let logs = engine.logs(&report.id).await.unwrap();
    assert_log_contains(&logs, "retry 1/2");
    assert_log_contains(&logs, "retry 2/2");
    assert_log_contains(&logs, "Step unit_tests failed");
}

/// A flaky step succeeds on its second attempt
#[tokio::test]
async fn test_retry_then_success() {
    let executor = FakeExecutor::new().on_sequence(
        "make test",
        vec![Script::fail(1, "flake"), Script::ok()],
    );
    let pipeline = Pipeline::new(
        "ci",
        vec![Step::new("unit_tests", "make test").with_max_retries(2)],
    );
    let engine = engine_with(vec![pipeline], fast_settings(), &executor);

    let report = run_to_end(&engine, "ci", HashMap::new()).await;

    assert_eq!(report.status, ExecutionStatus::Success);
    assert_eq!(executor.count("make test"), 2);
}

/// Retry n waits 2^n backoff units
#[tokio::test]
async fn test_backoff_grows_exponentially() {
    let executor = FakeExecutor::new().on("make test", Script::fail(1, ""));
    let pipeline = Pipeline::new(
        "ci",
        vec![Step::new("unit_tests", "make test").with_max_retries(2)],
    );
    let settings = EngineSettings {
        backoff_unit_ms: 20,
        ..fast_settings()
    };
    let engine = engine_with(vec![pipeline], settings, &executor);

    run_to_end(&engine, "ci", HashMap::new()).await;

    let calls = executor.calls_for("make test");
    assert_eq!(calls.len(), 3);
    assert!(calls[1].started - calls[0].finished >= Duration::from_millis(40));
    assert!(calls[2].started - calls[1].finished >= Duration::from_millis(80));
}

/// Timeouts are reported without retrying
#[tokio::test]
async fn test_timeout_is_not_retried() {
    let executor = FakeExecutor::new().on("./integration.sh", Script::timeout());
    let pipeline = Pipeline::new(
        "ci",
        vec![Step::new("integration", "./integration.sh")
            .with_timeout(Duration::from_secs(30))
            .with_max_retries(3)],
    );
    let engine = engine_with(vec![pipeline], fast_settings(), &executor);

    let report = run_to_end(&engine, "ci", HashMap::new()).await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(executor.count("./integration.sh"), 1);
    assert!(report.error_message.unwrap().contains("timed out after 30s"));
}

/// The optional attempt cap bounds retries below max_retries
#[tokio::test]
async fn test_attempt_cap() {
    let executor = FakeExecutor::new().on("make test", Script::fail(1, ""));
    let pipeline = Pipeline::new(
        "ci",
        vec![Step::new("unit_tests", "make test").with_max_retries(5)],
    );
    let settings = EngineSettings {
        max_step_attempts: Some(2),
        ..fast_settings()
    };
    let engine = engine_with(vec![pipeline], settings, &executor);

    run_to_end(&engine, "ci", HashMap::new()).await;
    assert_eq!(executor.count("make test"), 2);
}
