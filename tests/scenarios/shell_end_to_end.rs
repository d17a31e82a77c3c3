//! Test: real shell commands against filesystem-backed stores

use jobgraph::core::config::PipelineConfig;
use jobgraph::core::{JobStatus, Pipeline, PipelineContext, PipelineResult, StepStatus};
use jobgraph::execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy};
use jobgraph::runner::ShellTaskRunner;
use jobgraph::store::{ArtifactStore, FsArtifactStore, FsCacheStore};
use std::path::Path;
use std::sync::{Arc, Mutex};

async fn run_with_shell(
    yaml: &str,
    workspace: &Path,
    store_root: &Path,
) -> (Pipeline, PipelineResult, Vec<ExecutionEvent>) {
    let mut pipeline = PipelineConfig::from_yaml(yaml).unwrap().to_pipeline();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut engine = ExecutionEngine::new(Arc::new(ShellTaskRunner::default()), SchedulingStrategy::Parallel)
        .with_cache_store(Arc::new(FsCacheStore::new(store_root.join("cache"))))
        .with_artifact_store(Arc::new(FsArtifactStore::new(
            store_root.join("artifacts").join(pipeline.state.execution_id.to_string()),
        )));
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let result = engine
        .execute(&mut pipeline, &PipelineContext::new(workspace))
        .await
        .unwrap();
    let events = events.lock().unwrap().clone();
    (pipeline, result, events)
}

const BUILD: &str = r#"
name: "shell-build"
variables:
  greeting: "built"
jobs:
  - id: "build"
    steps:
      - id: "deps-cache"
        cache:
          path: ".deps"
          prefix: "deps"
      - id: "compile"
        run: |
          mkdir -p .deps out
          echo vendored > .deps/lib.txt
          echo {{ greeting }} > out/result.txt
      - id: "result"
        upload:
          name: "result"
          paths: ["out/*.txt"]
  - id: "verify"
    needs: ["build"]
    steps:
      - run: "test -f out/result.txt"
"#;

#[tokio::test]
async fn test_shell_pipeline_uploads_artifact() {
    let workspace = tempfile::tempdir().unwrap();
    let stores = tempfile::tempdir().unwrap();

    let (pipeline, result, events) = run_with_shell(BUILD, workspace.path(), stores.path()).await;

    assert!(result.is_success(), "{:?}", result.jobs);
    assert_eq!(result.job_status("verify"), Some(JobStatus::Succeeded));

    let artifacts = FsArtifactStore::new(
        stores
            .path()
            .join("artifacts")
            .join(pipeline.state.execution_id.to_string()),
    );
    let artifact = artifacts.get("result").await.unwrap().unwrap();
    assert_eq!(artifact.job_id, "build");
    assert_eq!(
        artifact.files.get("out/result.txt").map(|c| c.as_slice()),
        Some(&b"built\n"[..])
    );

    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::CacheMissed { job_id, .. } if job_id == "build")));
    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::CacheSaved { job_id, .. } if job_id == "build")));
}

#[tokio::test]
async fn test_cache_carries_over_to_a_fresh_workspace() {
    let stores = tempfile::tempdir().unwrap();
    let first = tempfile::tempdir().unwrap();
    let (_, result, _) = run_with_shell(BUILD, first.path(), stores.path()).await;
    assert!(result.is_success());

    let reuse = r#"
name: "shell-reuse"
jobs:
  - id: "consume"
    steps:
      - cache:
          path: ".deps"
          prefix: "deps"
      - run: "grep -q vendored .deps/lib.txt"
"#;
    let second = tempfile::tempdir().unwrap();
    let (_, result, events) = run_with_shell(reuse, second.path(), stores.path()).await;

    assert!(result.is_success());
    assert!(second.path().join(".deps/lib.txt").exists());
    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::CacheRestored { exact: true, .. })));
    assert!(!events.iter().any(|e| matches!(e, ExecutionEvent::CacheSaved { .. })));
}

#[tokio::test]
async fn test_exit_code_is_recorded() {
    let yaml = r#"
name: "shell-fail"
jobs:
  - id: "check"
    steps:
      - id: "fail"
        run: "echo broken >&2; exit 3"
"#;
    let workspace = tempfile::tempdir().unwrap();
    let stores = tempfile::tempdir().unwrap();

    let (pipeline, result, events) = run_with_shell(yaml, workspace.path(), stores.path()).await;

    assert!(!result.is_success());
    let steps = pipeline.job("check").unwrap().state.steps().to_vec();
    assert_eq!(steps[0].status, StepStatus::Failed);
    assert_eq!(steps[0].exit_code, Some(3));

    let output = events.iter().find_map(|e| match e {
        ExecutionEvent::StepFinished { output, .. } => Some(output.clone()),
        _ => None,
    });
    assert!(output.unwrap_or_default().contains("broken"));
}
