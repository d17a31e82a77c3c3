//! Test: an unavailable cache backend never changes a job's outcome

use crate::helpers::*;
use async_trait::async_trait;
use jobgraph::core::{JobStatus, StepStatus};
use jobgraph::execution::{ExecutionEvent, SchedulingStrategy};
use jobgraph::store::{CacheError, CacheHit, CacheStore, InMemoryCacheStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Cache backend whose every call fails
#[derive(Default)]
struct UnavailableCache {
    restores: AtomicUsize,
    saves: AtomicUsize,
}

#[async_trait]
impl CacheStore for UnavailableCache {
    async fn restore(&self, _keys: &[String]) -> Result<Option<CacheHit>, CacheError> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Io(std::io::Error::other("cache backend down")))
    }

    async fn save(&self, _key: &str, _blob: Vec<u8>) -> Result<(), CacheError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Io(std::io::Error::other("cache backend down")))
    }
}

const YAML: &str = r#"
name: "cached"
jobs:
  - id: "test"
    steps:
      - id: "venv-cache"
        cache:
          path: ".venv"
          prefix: "venv"
          hash_files: ["requirements.txt"]
      - id: "install"
        run: "pip install -r requirements.txt"
      - id: "pytest"
        run: "pytest"
"#;

fn workspace() -> tempfile::TempDir {
    let workspace = tempfile::tempdir().unwrap();
    write_file(workspace.path(), "requirements.txt", "pytest==8.3.3\n");
    write_file(workspace.path(), ".venv/bin/python", "#!/bin/sh\n");
    workspace
}

#[tokio::test]
async fn test_failing_cache_backend_is_a_miss() {
    let workspace = workspace();
    let runner = Arc::new(MockRunner::new());
    let cache = Arc::new(UnavailableCache::default());

    let run = run_yaml_with_cache(
        YAML,
        runner.clone(),
        workspace.path(),
        SchedulingStrategy::Parallel,
        cache.clone(),
    )
    .await;

    assert_eq!(run.job_status("test"), JobStatus::Succeeded);
    assert_eq!(run.step_status("test", "venv-cache"), Some(StepStatus::Succeeded));
    assert!(runner.ran("pip install"));
    assert!(runner.ran("pytest"));

    // restore was attempted and degraded to a miss; the save was attempted and dropped
    assert_eq!(cache.restores.load(Ordering::SeqCst), 1);
    assert_eq!(cache.saves.load(Ordering::SeqCst), 1);
    assert!(run
        .events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::CacheMissed { job_id, .. } if job_id == "test")));
    assert!(!run.events.iter().any(|e| matches!(e, ExecutionEvent::CacheSaved { .. })));
}

#[tokio::test]
async fn test_outcome_matches_working_cache() {
    let broken = run_yaml_with_cache(
        YAML,
        Arc::new(MockRunner::failing(&["pytest"])),
        workspace().path(),
        SchedulingStrategy::Parallel,
        Arc::new(UnavailableCache::default()),
    )
    .await;
    let working = run_yaml_with_cache(
        YAML,
        Arc::new(MockRunner::failing(&["pytest"])),
        workspace().path(),
        SchedulingStrategy::Parallel,
        Arc::new(InMemoryCacheStore::new()),
    )
    .await;

    assert_eq!(broken.job_status("test"), JobStatus::Failed);
    assert_eq!(broken.job_status("test"), working.job_status("test"));
    let statuses = |run: &TestRun| run.steps("test").into_iter().map(|s| s.status).collect::<Vec<_>>();
    assert_eq!(statuses(&broken), statuses(&working));
}
