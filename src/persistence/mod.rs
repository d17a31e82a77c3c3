//! Persistence layer for pipeline execution history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::{JobStatus, Pipeline};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Progress (0.0 to 1.0)
    pub progress: f64,

    pub total_jobs: usize,
    pub succeeded_jobs: usize,
    pub failed_jobs: usize,
    pub skipped_jobs: usize,

    /// Terminal status of every job
    pub jobs: BTreeMap<String, JobStatus>,
}

impl ExecutionSummary {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a pipeline execution
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load an execution by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// List all executions for a pipeline, newest first
    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// Most recent executions across all pipelines, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<ExecutionSummary>>;

    /// List all pipeline names
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(HashMap::new()),
        }
    }

    async fn sorted(&self, filter: impl Fn(&ExecutionSummary) -> bool) -> Vec<ExecutionSummary> {
        let execs = self.executions.read().await;
        let mut result: Vec<_> = execs.values().filter(|e| filter(e)).cloned().collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        execs.insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        Ok(self.sorted(|e| e.pipeline_name == pipeline_name).await)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ExecutionSummary>> {
        let mut all = self.sorted(|_| true).await;
        all.truncate(limit);
        Ok(all)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let execs = self.executions.read().await;
        let mut names: Vec<String> = execs.values().map(|e| e.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a pipeline
pub fn create_summary(pipeline: &Pipeline) -> ExecutionSummary {
    let result = pipeline.result();
    ExecutionSummary {
        execution_id: pipeline.state.execution_id,
        pipeline_name: pipeline.name.clone(),
        status: pipeline.state.status,
        started_at: pipeline.state.started_at.unwrap_or_else(Utc::now),
        completed_at: pipeline.state.completed_at,
        progress: pipeline.state.progress(),
        total_jobs: pipeline.state.total_jobs,
        succeeded_jobs: pipeline.state.succeeded_jobs,
        failed_jobs: pipeline.state.failed_jobs,
        skipped_jobs: pipeline.state.skipped_jobs,
        jobs: result.jobs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn summary(pipeline: &str, minutes_ago: i64) -> ExecutionSummary {
        ExecutionSummary {
            execution_id: Uuid::new_v4(),
            pipeline_name: pipeline.to_string(),
            status: ExecutionStatus::Succeeded,
            started_at: Utc::now() - Duration::minutes(minutes_ago),
            completed_at: None,
            progress: 1.0,
            total_jobs: 1,
            succeeded_jobs: 1,
            failed_jobs: 0,
            skipped_jobs: 0,
            jobs: BTreeMap::from([("test".to_string(), JobStatus::Succeeded)]),
        }
    }

    #[tokio::test]
    async fn test_in_memory_history() {
        let store = InMemoryPersistence::new();
        let old = summary("python-ci", 10);
        let new = summary("python-ci", 1);
        let other = summary("docs", 5);
        for s in [&old, &new, &other] {
            store.save_execution(s).await.unwrap();
        }

        let listed = store.list_executions("python-ci").await.unwrap();
        assert_eq!(listed.iter().map(|e| e.execution_id).collect::<Vec<_>>(), vec![new.execution_id, old.execution_id]);

        let recent = store.list_recent(2).await.unwrap();
        assert_eq!(recent.iter().map(|e| e.execution_id).collect::<Vec<_>>(), vec![new.execution_id, other.execution_id]);

        assert_eq!(store.list_pipelines().await.unwrap(), vec!["docs", "python-ci"]);
        assert_eq!(store.load_execution(other.execution_id).await.unwrap(), Some(other));
    }

    #[test]
    fn test_create_summary_from_fresh_pipeline() {
        let config = crate::core::config::PipelineConfig::from_yaml(
            r#"
name: "python-ci"
jobs:
  - id: "test"
    steps: [{ run: "pytest" }]
"#,
        )
        .unwrap();
        let pipeline = config.to_pipeline();
        let summary = create_summary(&pipeline);

        assert_eq!(summary.pipeline_name, "python-ci");
        assert_eq!(summary.jobs.get("test"), Some(&JobStatus::Pending));
        assert!(!summary.is_success());
    }
}
