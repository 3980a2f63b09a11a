//! Test: Failure Handling - soft passes, hard failures, cancellation

use crate::helpers::*;
use pipeline_engine::{EngineSettings, ExecutionStatus, HealState, Pipeline, Step};
use std::collections::HashMap;
use std::time::Duration;

fn lint_then_package(continue_on_error: bool) -> Pipeline {
    Pipeline::new(
        "release",
        vec![
            Step::new("lint", "make lint")
                .with_max_retries(0)
                .continue_on_error(continue_on_error),
            Step::new("package", "make dist").with_dependencies(["lint"]),
        ],
    )
}

/// A soft-passed step still unblocks its dependents and the run succeeds
#[tokio::test]
async fn test_continue_on_error_soft_pass() {
    let executor = FakeExecutor::new().on("make lint", Script::fail(1, "3 warnings"));
    let engine = engine_with(vec![lint_then_package(true)], fast_settings(), &executor);

    let report = run_to_end(&engine, "release", HashMap::new()).await;

    assert_eq!(report.status, ExecutionStatus::Success);
    assert_eq!(executor.count("make dist"), 1);
    assert_ran_before(&executor, "make lint", "make dist");

    let logs = engine.logs(&report.id).await.unwrap();
    assert_log_contains(&logs, "Step lint failed but continue_on_error is set; marking completed");
    assert_log_contains(&logs, "Step package completed successfully");
}

/// A hard failure fails the run and its dependents never start
#[tokio::test]
async fn test_hard_failure_stops_dependents() {
    let executor = FakeExecutor::new().on("make lint", Script::fail(1, "3 errors"));
    let engine = engine_with(vec![lint_then_package(false)], fast_settings(), &executor);

    let report = run_to_end(&engine, "release", HashMap::new()).await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(executor.count("make dist"), 0);

    let error = report.error_message.unwrap();
    assert!(error.contains("Pipeline failed at step 'lint'"), "{}", error);
    assert!(error.contains("exited with code 1"), "{}", error);
    assert!(error.contains("3 errors"), "{}", error);
    assert_eq!(report.heal, Some(HealState::NoMatchingPattern));
    assert_eq!(engine.stats().await.failed_executions, 1);
}

/// Siblings in the same frontier still finish when one of them fails
#[tokio::test]
async fn test_sibling_of_failed_step_completes() {
    let executor = FakeExecutor::new()
        .on("make lint", Script::fail(1, ""))
        .on("make docs", Script::ok().with_delay(Duration::from_millis(50)));
    let pipeline = Pipeline::new(
        "release",
        vec![
            Step::new("lint", "make lint").with_max_retries(0),
            Step::new("docs", "make docs"),
            Step::new("package", "make dist").with_dependencies(["lint", "docs"]),
        ],
    );
    let engine = engine_with(vec![pipeline], fast_settings(), &executor);

    let report = run_to_end(&engine, "release", HashMap::new()).await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(executor.count("make docs"), 1);
    assert_eq!(executor.count("make dist"), 0);
    let logs = engine.logs(&report.id).await.unwrap();
    assert_log_contains(&logs, "Step docs completed successfully");
}

/// A placeholder without a parameter fails the step before anything runs
#[tokio::test]
async fn test_missing_placeholder_fails_without_running() {
    let executor = FakeExecutor::new();
    let pipeline = Pipeline::new(
        "deploy",
        vec![Step::new("push", "kubectl apply -n {namespace} -f k8s/").with_max_retries(3)],
    );
    let engine = engine_with(vec![pipeline], fast_settings(), &executor);

    let report = run_to_end(&engine, "deploy", HashMap::new()).await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert!(executor.calls().is_empty());
    assert!(report
        .error_message
        .unwrap()
        .contains("missing placeholder '{namespace}'"));
}

/// Stopping the engine cancels running executions
#[tokio::test]
async fn test_stop_cancels_running_execution() {
    let executor = FakeExecutor::new()
        .on("make build", Script::ok().with_delay(Duration::from_millis(200)));
    let pipeline = Pipeline::new(
        "slow",
        vec![
            Step::new("build", "make build"),
            Step::new("publish", "make publish").with_dependencies(["build"]),
        ],
    );
    let engine = engine_with(vec![pipeline], fast_settings(), &executor);
    engine.start().await;

    let id = engine.execute("slow", None, HashMap::new()).await.unwrap();
    while engine.status(&id).await.unwrap().status != ExecutionStatus::Running {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    engine.stop().await;

    // Let the in-flight step finish; its result must not revive the record
    tokio::time::sleep(Duration::from_millis(400)).await;
    let report = engine.status(&id).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Cancelled);
    assert_eq!(executor.count("make build"), 1);
    assert_eq!(executor.count("make publish"), 0);
}

/// With auto-heal disabled a failure is final and carries no heal state
#[tokio::test]
async fn test_failure_with_auto_heal_disabled() {
    let executor = FakeExecutor::new().on("pytest", Script::fail(1, "No module named 'yaml'"));
    let pipeline = Pipeline::new("py", vec![Step::new("test", "pytest").with_max_retries(0)]);
    let settings = EngineSettings {
        auto_heal: false,
        ..fast_settings()
    };
    let engine = engine_with(vec![pipeline], settings, &executor);

    let report = run_to_end(&engine, "py", HashMap::new()).await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert!(report.heal.is_none());
    assert_eq!(executor.count("pip install -r requirements.txt"), 0);
}
