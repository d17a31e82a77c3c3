//! Test: jobs start only when their dependencies allow it

use crate::helpers::*;
use jobgraph::core::{ExecutionStatus, JobState, JobStatus};
use jobgraph::execution::{ExecutionEvent, SchedulingStrategy};
use std::sync::Arc;

const CHAIN: &str = r#"
name: "chain"
jobs:
  - id: "lint"
    steps: [{ run: "ruff check ." }]
  - id: "test"
    needs: ["lint"]
    steps: [{ run: "pytest" }]
  - id: "publish"
    needs: ["test"]
    steps: [{ run: "twine upload dist/*" }]
  - id: "docs"
    steps: [{ run: "mkdocs build" }]
"#;

/// A failed job skips everything downstream, transitively
#[tokio::test]
async fn test_failure_skips_downstream_jobs() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::failing(&["ruff"]));

    let run = run_yaml(CHAIN, runner.clone(), workspace.path(), SchedulingStrategy::Parallel).await;

    assert_eq!(run.result.status, ExecutionStatus::Failed);
    assert_eq!(run.job_status("lint"), JobStatus::Failed);
    assert_eq!(run.job_status("test"), JobStatus::Skipped);
    assert_eq!(run.job_status("publish"), JobStatus::Skipped);
    assert_eq!(run.job_status("docs"), JobStatus::Succeeded);

    assert!(!runner.ran("pytest"));
    assert!(!runner.ran("twine"));

    let Some(JobState::Skipped { reason }) = run.pipeline.job("publish").map(|j| j.state.clone()) else {
        panic!("publish should be skipped");
    };
    assert!(reason.contains("test"), "unexpected reason: {}", reason);

    assert_eq!(run.pipeline.state.failed_jobs, 1);
    assert_eq!(run.pipeline.state.skipped_jobs, 2);
    assert_eq!(run.pipeline.state.succeeded_jobs, 1);
}

/// Jobs never start before their dependencies finished
#[tokio::test]
async fn test_diamond_start_order() {
    let yaml = r#"
name: "diamond"
jobs:
  - id: "checkout"
    steps: [{ run: "git fetch" }]
  - id: "unit"
    needs: ["checkout"]
    steps: [{ run: "pytest tests/unit" }]
  - id: "integration"
    needs: ["checkout"]
    steps: [{ run: "pytest tests/integration" }]
  - id: "report"
    needs: ["unit", "integration"]
    steps: [{ run: "coverage report" }]
"#;
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());

    let run = run_yaml(yaml, runner, workspace.path(), SchedulingStrategy::Sequential).await;

    assert!(run.result.is_success());
    let order = run.started_jobs();
    assert_eq!(order.len(), 4);
    assert_eq!(order[0], "checkout");
    assert_eq!(order[3], "report");
    assert_eq!(run.pipeline.execution_order()[0], "checkout");
}

/// A `run_always` job runs once its dependencies are terminal, even if they failed
#[tokio::test]
async fn test_run_always_job_runs_after_failure() {
    let yaml = r#"
name: "cleanup"
jobs:
  - id: "deploy"
    steps: [{ run: "deploy.sh" }]
  - id: "notify"
    needs: ["deploy"]
    steps: [{ run: "notify.sh" }]
  - id: "teardown"
    needs: ["deploy"]
    run_always: true
    steps: [{ run: "teardown.sh" }]
"#;
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::failing(&["deploy.sh"]));

    let run = run_yaml(yaml, runner.clone(), workspace.path(), SchedulingStrategy::Parallel).await;

    assert_eq!(run.job_status("deploy"), JobStatus::Failed);
    assert_eq!(run.job_status("notify"), JobStatus::Skipped);
    assert_eq!(run.job_status("teardown"), JobStatus::Succeeded);
    assert!(runner.ran("teardown.sh"));
    assert_eq!(run.result.status, ExecutionStatus::Failed);
}

/// Every job ends with exactly one terminal event
#[tokio::test]
async fn test_every_job_reports_once() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::failing(&["pytest"]));

    let run = run_yaml(CHAIN, runner, workspace.path(), SchedulingStrategy::LimitedParallel(2)).await;

    for job_id in ["lint", "test", "publish", "docs"] {
        let terminal = run
            .events
            .iter()
            .filter(|e| match e {
                ExecutionEvent::JobFinished { job_id: id, .. } | ExecutionEvent::JobSkipped { job_id: id, .. } => {
                    id == job_id
                }
                _ => false,
            })
            .count();
        assert_eq!(terminal, 1, "job {} reported {} times", job_id, terminal);
    }

    assert!(matches!(run.events.first(), Some(ExecutionEvent::PipelineStarted { total_jobs: 4, .. })));
    assert!(matches!(
        run.events.last(),
        Some(ExecutionEvent::PipelineCompleted {
            status: ExecutionStatus::Failed,
            ..
        })
    ));
}
