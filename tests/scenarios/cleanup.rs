//! Test: Cleanup - retention of execution records

use crate::helpers::*;
use chrono::{Duration, Utc};
use pipeline_engine::{ExecutionRecord, ExecutionStatus, Pipeline, Step};
use std::collections::HashMap;

fn aged_record(id: &str, days: i64) -> ExecutionRecord {
    let steps = vec![Step::new("make", "make")];
    let mut record = ExecutionRecord::new(id, "build", steps, HashMap::new());
    record.status = ExecutionStatus::Success;
    record.started_at = Utc::now() - Duration::days(days) - Duration::minutes(1);
    record.ended_at = Some(Utc::now() - Duration::days(days));
    record
}

/// Records past the retention window disappear, newer ones stay
#[tokio::test]
async fn test_expired_records_are_removed() {
    let executor = FakeExecutor::new();
    let engine = engine_with(
        vec![Pipeline::new("build", vec![Step::new("make", "make")])],
        fast_settings(),
        &executor,
    );

    engine.tracker().insert(aged_record("last-month", 30)).await.unwrap();
    engine.tracker().insert(aged_record("last-week", 8)).await.unwrap();
    engine.tracker().insert(aged_record("yesterday", 1)).await.unwrap();
    let fresh = run_to_end(&engine, "build", HashMap::new()).await;

    let summary = engine.optimize().await;
    assert_eq!(summary.removed_executions, 2);
    assert_eq!(summary.optimizations, 1);

    let ids: Vec<String> = engine
        .list_executions(100)
        .await
        .into_iter()
        .map(|s| s.execution_id)
        .collect();
    assert_eq!(ids, vec![fresh.id, "yesterday".to_string()]);
    assert_eq!(engine.stats().await.optimizations_performed, 1);
}

/// A pass with nothing to do does not count as an optimization
#[tokio::test]
async fn test_idle_pass() {
    let executor = FakeExecutor::new();
    let engine = engine_with(vec![], fast_settings(), &executor);

    let summary = engine.optimize().await;
    assert_eq!(summary.removed_executions, 0);
    assert_eq!(summary.optimizations, 0);
    assert_eq!(engine.stats().await.optimizations_performed, 0);
}
