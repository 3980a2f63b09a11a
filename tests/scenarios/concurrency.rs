//! Test: Concurrency - frontier steps overlap, strategies bound them

use crate::helpers::*;
use pipeline_engine::{EngineSettings, ExecutionStatus, Pipeline, SchedulingStrategy, Step};
use std::collections::HashMap;
use std::time::Duration;

const STEP_TIME: Duration = Duration::from_millis(150);

fn fan_out(executor: &std::sync::Arc<FakeExecutor>) -> Pipeline {
    for command in ["lint", "unit", "docs"] {
        executor.on(command, Script::ok().with_delay(STEP_TIME));
    }
    Pipeline::new(
        "fan-out",
        vec![
            Step::new("checkout", "checkout"),
            Step::new("lint", "lint").with_dependencies(["checkout"]),
            Step::new("unit", "unit").with_dependencies(["checkout"]),
            Step::new("docs", "docs").with_dependencies(["checkout"]),
            Step::new("publish", "publish").with_dependencies(["lint", "unit", "docs"]),
        ],
    )
}

fn windows(executor: &FakeExecutor) -> Vec<Call> {
    ["lint", "unit", "docs"]
        .iter()
        .flat_map(|c| executor.calls_for(c))
        .collect()
}

/// Steps of one frontier run at the same time
#[tokio::test]
async fn test_frontier_steps_overlap() {
    let executor = FakeExecutor::new();
    let pipeline = fan_out(&executor);
    let engine = engine_with(vec![pipeline], fast_settings(), &executor);

    let report = run_to_end(&engine, "fan-out", HashMap::new()).await;
    assert_eq!(report.status, ExecutionStatus::Success);

    let calls = windows(&executor);
    assert_eq!(calls.len(), 3);
    let latest_start = calls.iter().map(|c| c.started).max().unwrap();
    let earliest_end = calls.iter().map(|c| c.finished).min().unwrap();
    assert!(latest_start < earliest_end, "frontier steps ran sequentially");

    for step in ["lint", "unit", "docs"] {
        assert_ran_before(&executor, "checkout", step);
        assert_ran_before(&executor, step, "publish");
    }
}

/// The sequential strategy runs one step at a time
#[tokio::test]
async fn test_sequential_strategy_does_not_overlap() {
    let executor = FakeExecutor::new();
    let pipeline = fan_out(&executor);
    let settings = EngineSettings {
        strategy: SchedulingStrategy::Sequential,
        ..fast_settings()
    };
    let engine = engine_with(vec![pipeline], settings, &executor);

    let report = run_to_end(&engine, "fan-out", HashMap::new()).await;
    assert_eq!(report.status, ExecutionStatus::Success);

    let mut calls = windows(&executor);
    calls.sort_by_key(|c| c.started);
    for pair in calls.windows(2) {
        assert!(pair[0].finished <= pair[1].started, "steps overlapped");
    }
}

/// Concurrent runs of one pipeline keep their own step copies
#[tokio::test]
async fn test_concurrent_executions_are_isolated() {
    let executor = FakeExecutor::new()
        .on("flaky fail", Script::fail(1, "boom"))
        .on("flaky pass", Script::ok().with_delay(Duration::from_millis(50)));
    let pipeline = Pipeline::new("p", vec![Step::new("flaky", "flaky {mode}").with_max_retries(2)]);
    let engine = engine_with(vec![pipeline], fast_settings(), &executor);

    let failing = engine
        .execute("p", None, params(&[("mode", "fail")]))
        .await
        .unwrap();
    let passing = engine
        .execute("p", None, params(&[("mode", "pass")]))
        .await
        .unwrap();

    let failing = engine.wait_until_settled(&failing, WAIT).await.unwrap();
    let passing = engine.wait_until_settled(&passing, WAIT).await.unwrap();
    assert_eq!(failing.status, ExecutionStatus::Failed);
    assert_eq!(passing.status, ExecutionStatus::Success);

    let failing = engine.tracker().get(&failing.id).await.unwrap();
    let passing = engine.tracker().get(&passing.id).await.unwrap();
    assert_eq!(failing.steps[0].retry_count, 2);
    assert_eq!(passing.steps[0].retry_count, 0);

    let pipeline = engine.catalog().get("p").await.unwrap();
    assert_eq!(pipeline.steps[0].retry_count, 0);
}
