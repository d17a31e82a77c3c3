//! Test: step ordering, continue_on_error, always steps and variables

use crate::helpers::*;
use jobgraph::core::{JobStatus, StepStatus};
use jobgraph::execution::SchedulingStrategy;
use std::sync::Arc;

const YAML: &str = r#"
name: "steps"
variables:
  python_version: "3.12"
jobs:
  - id: "test"
    steps:
      - id: "lint"
        run: "flake8 src"
        continue_on_error: true
      - id: "pytest"
        run: "python{{ python_version }} -m pytest"
      - id: "coverage"
        run: "coverage xml"
      - id: "reports"
        always: true
        upload:
          name: "reports"
          paths: ["reports/*.xml"]
"#;

/// The first blocking failure skips the remaining steps
#[tokio::test]
async fn test_blocking_failure_skips_later_steps() {
    let workspace = tempfile::tempdir().unwrap();
    write_file(workspace.path(), "reports/junit.xml", "<testsuite/>");
    let runner = Arc::new(MockRunner::failing(&["pytest"]));

    let run = run_yaml(YAML, runner.clone(), workspace.path(), SchedulingStrategy::Parallel).await;

    assert_eq!(run.job_status("test"), JobStatus::Failed);
    assert_eq!(run.step_status("test", "pytest"), Some(StepStatus::Failed));
    assert_eq!(run.step_status("test", "coverage"), Some(StepStatus::Skipped));
    assert!(!runner.ran("coverage"));

    // always steps still run
    assert_eq!(run.step_status("test", "reports"), Some(StepStatus::Succeeded));
    assert_eq!(run.artifacts.names().await, vec!["reports".to_string()]);
}

/// A failing `continue_on_error` step is tolerated and the job carries on
#[tokio::test]
async fn test_continue_on_error_is_tolerated() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::failing(&["flake8"]));

    let run = run_yaml(YAML, runner.clone(), workspace.path(), SchedulingStrategy::Parallel).await;

    assert_eq!(run.job_status("test"), JobStatus::Succeeded);
    assert_eq!(run.step_status("test", "lint"), Some(StepStatus::Tolerated));
    assert_eq!(run.step_status("test", "pytest"), Some(StepStatus::Succeeded));
    assert!(runner.ran("coverage"));
    assert!(run.result.is_success());
}

/// Steps run in declaration order with variables rendered
#[tokio::test]
async fn test_steps_run_in_order_with_variables() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());

    let run = run_yaml(YAML, runner.clone(), workspace.path(), SchedulingStrategy::Parallel).await;

    assert_eq!(
        runner.calls(),
        vec![
            "flake8 src".to_string(),
            "python3.12 -m pytest".to_string(),
            "coverage xml".to_string(),
        ]
    );

    let ids: Vec<String> = run.steps("test").into_iter().map(|s| s.step_id).collect();
    assert_eq!(ids, vec!["lint", "pytest", "coverage", "reports"]);

    // no report files: the default policy only warns
    assert_eq!(run.step_status("test", "reports"), Some(StepStatus::Succeeded));
    assert!(run.artifacts.names().await.is_empty());
}

/// An upload with `if_no_files_found: error` fails the job
#[tokio::test]
async fn test_missing_files_error_policy_fails_job() {
    let yaml = r#"
name: "upload"
jobs:
  - id: "build"
    steps:
      - run: "python -m build"
      - upload:
          name: "dist"
          paths: ["dist/*.whl"]
          if_no_files_found: error
"#;
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());

    let run = run_yaml(yaml, runner, workspace.path(), SchedulingStrategy::Parallel).await;

    assert_eq!(run.job_status("build"), JobStatus::Failed);
    assert_eq!(run.step_status("build", "step-2"), Some(StepStatus::Failed));
}
