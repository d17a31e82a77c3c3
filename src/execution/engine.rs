//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{ExecutionStatus, JobState, Pipeline, PipelineContext, PipelineResult},
    execution::{
        events::{EventSink, ExecutionEvent},
        job::{JobExecutor, JobReport},
        scheduler::{ExecutionScheduler, SchedulingStrategy},
    },
    runner::TaskRunner,
    store::{ArtifactStore, CacheStore, InMemoryArtifactStore, InMemoryCacheStore},
};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("pipeline stalled: jobs {0:?} can never start")]
    Stalled(Vec<String>),

    #[error("job '{0}' not found")]
    JobNotFound(String),

    #[error("job supervisor failed: {0}")]
    Supervisor(#[from] JoinError),
}

/// Main pipeline execution engine
pub struct ExecutionEngine<R: ?Sized> {
    scheduler: ExecutionScheduler,
    runner: Arc<R>,
    cache: Arc<dyn CacheStore>,
    artifacts: Arc<dyn ArtifactStore>,
    events: EventSink,
}

impl<R: TaskRunner + ?Sized + 'static> ExecutionEngine<R> {
    /// Engine with in-memory cache and artifact stores
    pub fn new(runner: Arc<R>, strategy: SchedulingStrategy) -> Self {
        Self {
            scheduler: ExecutionScheduler::new(strategy),
            runner,
            cache: Arc::new(InMemoryCacheStore::new()),
            artifacts: Arc::new(InMemoryArtifactStore::new()),
            events: EventSink::new(),
        }
    }

    pub fn with_cache_store(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_artifact_store(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.add(handler);
    }

    /// Execute the entire pipeline
    ///
    /// Step and job failures are part of the returned result; an error means
    /// the run itself could not be completed.
    pub async fn execute(
        &self,
        pipeline: &mut Pipeline,
        context: &PipelineContext,
    ) -> Result<PipelineResult, EngineError> {
        let execution_id = pipeline.state.execution_id;
        let mut context = context.clone();
        context.execution_id = execution_id;
        for (key, value) in &pipeline.variables {
            context.variables.entry(key.clone()).or_insert_with(|| value.clone());
        }

        info!("Starting pipeline execution: {} ({})", pipeline.name, execution_id);
        self.events.emit(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            total_jobs: pipeline.jobs.len(),
        });
        pipeline.state.start(pipeline.jobs.len());

        let executor = Arc::new(JobExecutor::new(
            self.runner.clone(),
            self.cache.clone(),
            self.artifacts.clone(),
            self.events.clone(),
        ));
        let mut running: JoinSet<(String, Result<JobReport, JoinError>)> = JoinSet::new();

        loop {
            self.skip_blocked_jobs(pipeline);

            for job_id in self.scheduler.next_jobs(pipeline) {
                let job = pipeline
                    .job(&job_id)
                    .cloned()
                    .ok_or_else(|| EngineError::JobNotFound(job_id.clone()))?;

                if let Some(job) = pipeline.job_mut(&job_id) {
                    job.state = JobState::Running { started_at: Utc::now() };
                }
                info!("Starting job: {}", job_id);
                self.events.emit(ExecutionEvent::JobStarted { job_id: job_id.clone() });

                let executor = executor.clone();
                let context = context.clone();
                let handle = tokio::spawn(async move { executor.execute(&job, &context).await });
                running.spawn(async move { (job_id, handle.await) });
            }

            self.update_state_counts(pipeline);

            if running.is_empty() {
                if pipeline.is_complete() {
                    break;
                }

                let stuck: Vec<String> = pipeline
                    .execution_order()
                    .iter()
                    .filter(|id| pipeline.job(id).is_some_and(|j| !j.state.is_terminal()))
                    .cloned()
                    .collect();
                error!("No jobs ready to run and none running - pipeline stuck: {:?}", stuck);
                pipeline.state.finish(ExecutionStatus::Failed);
                self.events.emit(ExecutionEvent::PipelineCompleted {
                    execution_id,
                    status: ExecutionStatus::Failed,
                });
                return Err(EngineError::Stalled(stuck));
            }

            let Some(joined) = running.join_next().await else {
                continue;
            };
            let (job_id, report) = joined?;
            self.finish_job(pipeline, &job_id, report);
        }

        let status = pipeline.overall_status();
        pipeline.state.finish(status);
        self.update_state_counts(pipeline);

        info!("Pipeline execution finished: {} - {:?}", pipeline.name, status);
        self.events.emit(ExecutionEvent::PipelineCompleted { execution_id, status });

        Ok(pipeline.result())
    }

    /// Mark every pending job that can no longer run as skipped, until nothing changes
    fn skip_blocked_jobs(&self, pipeline: &mut Pipeline) {
        loop {
            let to_skip = pipeline.jobs_to_skip();
            if to_skip.is_empty() {
                return;
            }

            for (job_id, reason) in to_skip {
                info!("Skipping job {}: {}", job_id, reason);
                if let Some(job) = pipeline.job_mut(&job_id) {
                    job.state = JobState::Skipped { reason: reason.clone() };
                }
                self.events.emit(ExecutionEvent::JobSkipped { job_id, reason });
            }
        }
    }

    /// Record a job's terminal state
    fn finish_job(&self, pipeline: &mut Pipeline, job_id: &str, report: Result<JobReport, JoinError>) {
        let state = match report {
            Ok(report) => report.into_state(),
            Err(e) => {
                warn!("Job {} did not finish: {}", job_id, e);
                let started_at = match pipeline.job(job_id).map(|j| &j.state) {
                    Some(JobState::Running { started_at }) => *started_at,
                    _ => Utc::now(),
                };
                JobState::Failed {
                    error: format!("job task aborted: {}", e),
                    steps: Vec::new(),
                    started_at,
                    finished_at: Utc::now(),
                }
            }
        };

        let status = state.status();
        if let Some(job) = pipeline.job_mut(job_id) {
            job.state = state;
        }
        self.events.emit(ExecutionEvent::JobFinished {
            job_id: job_id.to_string(),
            status,
        });
    }

    /// Update pipeline state counts
    fn update_state_counts(&self, pipeline: &mut Pipeline) {
        let statuses: Vec<_> = pipeline.jobs.values().map(|j| j.status()).collect();
        pipeline.state.update_counts(statuses.into_iter());
    }
}
