//! Test: Auto-heal - pattern-matched fixes and resubmission

use crate::helpers::*;
use pipeline_engine::{ExecutionStatus, HealState, Pipeline, Step};

const PIP_FIX: &str = "pip install -r requirements.txt";

fn python_pipeline() -> Pipeline {
    Pipeline::new(
        "py",
        vec![
            Step::new("checkout", "git clone {repo}"),
            Step::new("test", "pytest").with_dependencies(["checkout"]).with_max_retries(0),
        ],
    )
}

/// A missing module runs the import_error fix and resubmits the pipeline
#[tokio::test]
async fn test_import_error_is_healed() {
    let executor = FakeExecutor::new().on_sequence(
        "pytest",
        vec![
            Script::fail(1, "ModuleNotFoundError: No module named 'requests'"),
            Script::ok().with_output("5 passed"),
        ],
    );
    let engine = engine_with(vec![python_pipeline()], fast_settings(), &executor);

    let id = engine
        .execute("py", None, params(&[("repo", "git@example.com:app.git")]))
        .await
        .unwrap();
    let chain = follow_heal_chain(&engine, &id).await;

    assert_eq!(chain.len(), 2);
    let (failed, retried) = (&chain[0], &chain[1]);

    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert_eq!(
        failed.heal,
        Some(HealState::Resubmitted {
            pattern: "import_error".to_string(),
            execution_id: retried.id.clone(),
        })
    );
    assert_eq!(executor.count(PIP_FIX), 1);

    assert!(retried.id.starts_with(&format!("{}_retry_", id)), "{}", retried.id);
    assert_eq!(retried.pipeline_name, "py");
    assert_eq!(retried.metadata, failed.metadata);
    assert_eq!(retried.heal_depth, 1);
    assert_eq!(retried.status, ExecutionStatus::Success);

    let stats = engine.stats().await;
    assert_eq!(stats.auto_fixes_applied, 1);
    assert_eq!(stats.total_executions, 2);
    assert_eq!(engine.list_executions(10).await.len(), 2);
}

/// When every fix command fails there is no resubmission
#[tokio::test]
async fn test_failed_fixes_do_not_resubmit() {
    let executor = FakeExecutor::new()
        .on("pytest", Script::fail(1, "No module named 'requests'"))
        .on(PIP_FIX, Script::fail(1, "Could not open requirements file"));
    let engine = engine_with(vec![python_pipeline()], fast_settings(), &executor);

    let report = run_to_end(&engine, "py", params(&[("repo", "r")])).await;

    assert_eq!(
        report.heal,
        Some(HealState::FixesFailed {
            pattern: "import_error".to_string()
        })
    );
    assert_eq!(engine.list_executions(10).await.len(), 1);
    assert_eq!(engine.stats().await.auto_fixes_applied, 0);
}

/// Only the first matching pattern's fixes run, and a failing fix does not
/// stop the next one
#[tokio::test]
async fn test_first_matching_pattern_runs_all_its_fixes() {
    let executor = FakeExecutor::new()
        .on("make image", Script::fail(1, "write /var/lib: No space left on device (ENOSPC)"))
        .on("docker system prune -af", Script::fail(1, "daemon not running"));
    let pipeline = Pipeline::new("img", vec![Step::new("image", "make image").with_max_retries(0)]);
    let engine = engine_with(
        vec![pipeline],
        pipeline_engine::EngineSettings {
            max_heal_depth: Some(1),
            ..fast_settings()
        },
        &executor,
    );

    let id = engine.execute("img", None, Default::default()).await.unwrap();
    let chain = follow_heal_chain(&engine, &id).await;

    assert_eq!(executor.count("docker system prune -af"), 1);
    assert_eq!(executor.count("rm -rf /tmp/pipeline-cache"), 1);
    assert!(matches!(
        chain[0].heal,
        Some(HealState::Resubmitted { ref pattern, .. }) if pattern == "disk_space"
    ));
    assert_eq!(chain.last().unwrap().heal, Some(HealState::DepthLimitReached));
    assert_eq!(chain.len(), 2);
}
