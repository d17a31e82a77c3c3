//! Test: fallback steps replace a failing command

use crate::helpers::*;
use jobgraph::core::{JobStatus, StepStatus};
use jobgraph::execution::{ExecutionEvent, SchedulingStrategy};
use std::sync::Arc;

fn audit_yaml(continue_on_error: bool) -> String {
    format!(
        r#"
name: "audit"
jobs:
  - id: "security-scan"
    steps:
      - id: "dependency-audit"
        run: "safety check"
        continue_on_error: {}
        fallback:
          run: "pip-audit"
      - id: "bandit"
        run: "bandit -r src"
"#,
        continue_on_error
    )
}

#[tokio::test]
async fn test_fallback_rescues_failing_step() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::failing(&["safety"]));

    let run = run_yaml(&audit_yaml(false), runner.clone(), workspace.path(), SchedulingStrategy::Parallel).await;

    assert_eq!(run.job_status("security-scan"), JobStatus::Succeeded);
    assert_eq!(run.step_status("security-scan", "dependency-audit"), Some(StepStatus::Succeeded));
    assert_eq!(runner.calls(), vec!["safety check", "pip-audit", "bandit -r src"]);

    let steps = run.steps("security-scan");
    let attempts = &steps[0].attempts;
    assert_eq!(attempts.len(), 2);
    assert!(!attempts[0].success);
    assert_eq!(attempts[1].step_id, "dependency-audit-fallback");
    assert!(attempts[1].success);

    assert!(run.events.iter().any(|e| matches!(
        e,
        ExecutionEvent::FallbackTriggered { from_step, to_step, .. }
            if from_step == "dependency-audit" && to_step == "dependency-audit-fallback"
    )));
}

#[tokio::test]
async fn test_fallback_not_run_when_primary_succeeds() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());

    let run = run_yaml(&audit_yaml(false), runner.clone(), workspace.path(), SchedulingStrategy::Parallel).await;

    assert!(run.result.is_success());
    assert!(!runner.ran("pip-audit"));
    assert!(!run.events.iter().any(|e| matches!(e, ExecutionEvent::FallbackTriggered { .. })));
}

#[tokio::test]
async fn test_exhausted_chain_fails_step() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::failing(&["safety", "pip-audit"]));

    let run = run_yaml(&audit_yaml(false), runner.clone(), workspace.path(), SchedulingStrategy::Parallel).await;

    assert_eq!(run.job_status("security-scan"), JobStatus::Failed);
    assert_eq!(run.step_status("security-scan", "dependency-audit"), Some(StepStatus::Failed));
    assert_eq!(run.step_status("security-scan", "bandit"), Some(StepStatus::Skipped));
    assert!(!runner.ran("bandit"));
}

#[tokio::test]
async fn test_exhausted_chain_tolerated_with_continue_on_error() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::failing(&["safety", "pip-audit"]));

    let run = run_yaml(&audit_yaml(true), runner.clone(), workspace.path(), SchedulingStrategy::Parallel).await;

    assert_eq!(run.job_status("security-scan"), JobStatus::Succeeded);
    assert_eq!(run.step_status("security-scan", "dependency-audit"), Some(StepStatus::Tolerated));
    assert!(runner.ran("bandit"));
}
