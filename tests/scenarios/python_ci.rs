//! Test: the bundled python-ci pipeline

use crate::helpers::*;
use jobgraph::core::{ExecutionStatus, JobStatus, StepStatus};
use jobgraph::execution::SchedulingStrategy;
use jobgraph::store::ArtifactStore;
use std::path::Path;
use std::sync::Arc;

fn python_ci_yaml() -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("pipelines/python-ci.yml");
    std::fs::read_to_string(path).unwrap()
}

fn workspace_with_outputs() -> tempfile::TempDir {
    let workspace = tempfile::tempdir().unwrap();
    write_file(workspace.path(), "requirements.txt", "requests==2.32.3\n");
    write_file(workspace.path(), "reports/junit.xml", "<testsuite tests=\"3\"/>");
    write_file(workspace.path(), "reports/bandit.json", "{\"results\": []}");
    write_file(workspace.path(), "dist/pkg-0.1.0-py3-none-any.whl", "wheel");
    workspace
}

/// When tests fail the package is not built, the scan still runs and the pipeline fails
#[tokio::test]
async fn test_failing_tests_skip_build_but_not_scan() {
    let workspace = workspace_with_outputs();
    let runner = Arc::new(MockRunner::failing(&["pytest"]));

    let run = run_yaml(&python_ci_yaml(), runner.clone(), workspace.path(), SchedulingStrategy::Parallel).await;

    assert_eq!(run.result.status, ExecutionStatus::Failed);
    assert_eq!(run.job_status("test"), JobStatus::Failed);
    assert_eq!(run.job_status("build-package"), JobStatus::Skipped);
    assert_eq!(run.job_status("security-scan"), JobStatus::Succeeded);
    assert!(!runner.ran("-m build"));
    assert!(runner.ran("bandit -r src"));

    // test reports are uploaded even though pytest failed
    assert_eq!(run.step_status("test", "test-reports"), Some(StepStatus::Succeeded));
    assert_eq!(
        run.artifacts.names().await,
        vec!["security-reports".to_string(), "test-reports".to_string()]
    );
}

/// A clean run records artifacts from every job
#[tokio::test]
async fn test_successful_run_records_all_artifacts() {
    let workspace = workspace_with_outputs();
    let runner = Arc::new(MockRunner::new());

    let run = run_yaml(&python_ci_yaml(), runner.clone(), workspace.path(), SchedulingStrategy::Parallel).await;

    assert!(run.result.is_success());
    assert_eq!(
        run.artifacts.names().await,
        vec![
            "dist".to_string(),
            "security-reports".to_string(),
            "test-reports".to_string()
        ]
    );

    let dist = run.artifacts.get("dist").await.unwrap().unwrap();
    assert_eq!(dist.job_id, "build-package");
    assert!(dist.files.contains_key("dist/pkg-0.1.0-py3-none-any.whl"));

    let reports = run.artifacts.get("test-reports").await.unwrap().unwrap();
    assert_eq!(reports.retention_days, Some(7));

    assert!(runner.ran("python3.12 -m pytest"));
    assert!(!runner.ran("pip-audit"));
}

/// The audit falls back to pip-audit and a double failure does not block the scan
#[tokio::test]
async fn test_audit_failure_is_tolerated() {
    let workspace = workspace_with_outputs();
    let runner = Arc::new(MockRunner::failing(&["safety", "pip-audit"]));

    let run = run_yaml(&python_ci_yaml(), runner.clone(), workspace.path(), SchedulingStrategy::Sequential).await;

    assert!(run.result.is_success());
    assert_eq!(
        run.step_status("security-scan", "dependency-audit"),
        Some(StepStatus::Tolerated)
    );
    assert_eq!(run.step_status("security-scan", "bandit"), Some(StepStatus::Succeeded));
}
