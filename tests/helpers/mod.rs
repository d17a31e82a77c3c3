//! Test utilities for pipeline scenarios

use async_trait::async_trait;
use jobgraph::core::config::PipelineConfig;
use jobgraph::core::{JobStatus, Pipeline, PipelineContext, PipelineResult, StepRecord, StepStatus};
use jobgraph::execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy};
use jobgraph::runner::{Outcome, Task, TaskRunner};
use jobgraph::store::{CacheStore, InMemoryArtifactStore, InMemoryCacheStore};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Mock runner: fails any script containing one of the configured fragments
#[derive(Default)]
pub struct MockRunner {
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(fragments: &[&str]) -> Self {
        Self {
            failing: fragments.iter().map(|f| f.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Scripts run so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ran(&self, fragment: &str) -> bool {
        self.calls().iter().any(|script| script.contains(fragment))
    }
}

#[async_trait]
impl TaskRunner for MockRunner {
    async fn run(&self, task: &Task) -> Outcome {
        self.calls.lock().unwrap().push(task.script.clone());
        if self.failing.iter().any(|f| task.script.contains(f.as_str())) {
            Outcome::failure(1, format!("{}: failed", task.step_id))
        } else {
            Outcome::success(format!("{}: ok", task.step_id))
        }
    }
}

/// Everything a scenario may want to assert on after a run
pub struct TestRun {
    pub pipeline: Pipeline,
    pub result: PipelineResult,
    pub events: Vec<ExecutionEvent>,
    pub artifacts: Arc<InMemoryArtifactStore>,
}

impl TestRun {
    pub fn job_status(&self, job_id: &str) -> JobStatus {
        self.result.job_status(job_id).unwrap_or(JobStatus::Pending)
    }

    pub fn steps(&self, job_id: &str) -> Vec<StepRecord> {
        self.pipeline
            .job(job_id)
            .map(|job| job.state.steps().to_vec())
            .unwrap_or_default()
    }

    pub fn step_status(&self, job_id: &str, step_id: &str) -> Option<StepStatus> {
        self.steps(job_id)
            .into_iter()
            .find(|s| s.step_id == step_id)
            .map(|s| s.status)
    }

    /// Job IDs in the order they started
    pub fn started_jobs(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::JobStarted { job_id } => Some(job_id.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Run `yaml` with a mock runner against an in-memory cache and artifact store
pub async fn run_yaml(
    yaml: &str,
    runner: Arc<MockRunner>,
    workspace: &Path,
    strategy: SchedulingStrategy,
) -> TestRun {
    run_yaml_with_cache(yaml, runner, workspace, strategy, Arc::new(InMemoryCacheStore::new())).await
}

/// Like [`run_yaml`], with a caller-supplied cache backend
pub async fn run_yaml_with_cache(
    yaml: &str,
    runner: Arc<MockRunner>,
    workspace: &Path,
    strategy: SchedulingStrategy,
    cache: Arc<dyn CacheStore>,
) -> TestRun {
    let config = PipelineConfig::from_yaml(yaml).unwrap();
    let mut pipeline = config.to_pipeline();
    let artifacts = Arc::new(InMemoryArtifactStore::new());

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut engine = ExecutionEngine::new(runner, strategy)
        .with_cache_store(cache)
        .with_artifact_store(artifacts.clone());
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let context = PipelineContext::new(workspace);
    let result = engine.execute(&mut pipeline, &context).await.unwrap();
    let events = events.lock().unwrap().clone();

    TestRun {
        pipeline,
        result,
        events,
        artifacts,
    }
}

/// Create `relative` under `root` (and its parent directories) with `contents`
pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
