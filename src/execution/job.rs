//! Job executor - runs a job's steps in order against the shared stores

use crate::{
    core::{
        collect_files, render_template, AttemptRecord, CacheKey, CacheSpec, Job, JobState,
        JobStatus, PipelineContext, Step, StepAction, StepRecord, StepStatus, UploadSpec,
        config::MissingFilesPolicy,
    },
    execution::{
        events::{EventSink, ExecutionEvent},
        fallback::FallbackChain,
    },
    runner::TaskRunner,
    store::{archive, Artifact, ArtifactStore, CacheStore},
};
use chrono::{DateTime, Utc};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a job ended
#[derive(Debug, Clone)]
pub struct JobReport {
    pub status: JobStatus,
    pub steps: Vec<StepRecord>,

    /// First blocking failure
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// Terminal job state for this report
    pub fn into_state(self) -> JobState {
        match self.error {
            Some(error) => JobState::Failed {
                error,
                steps: self.steps,
                started_at: self.started_at,
                finished_at: self.finished_at,
            },
            None => JobState::Succeeded {
                steps: self.steps,
                started_at: self.started_at,
                finished_at: self.finished_at,
            },
        }
    }
}

/// What a single step produced, before policy is applied
struct StepResult {
    success: bool,
    exit_code: Option<i32>,
    attempts: Vec<AttemptRecord>,
    output: String,
    error: Option<String>,
}

impl StepResult {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: None,
            attempts: Vec::new(),
            output: output.into(),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            exit_code: None,
            attempts: Vec::new(),
            output: error.clone(),
            error: Some(error),
        }
    }
}

/// A cache to save once the job has finished without failing
struct PendingSave {
    key: String,
    path: PathBuf,
}

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(io::Error::other)?
}

/// Executes the steps of one job
pub struct JobExecutor<R: ?Sized> {
    runner: Arc<R>,
    cache: Arc<dyn CacheStore>,
    artifacts: Arc<dyn ArtifactStore>,
    events: EventSink,
}

impl<R: TaskRunner + ?Sized> JobExecutor<R> {
    pub fn new(
        runner: Arc<R>,
        cache: Arc<dyn CacheStore>,
        artifacts: Arc<dyn ArtifactStore>,
        events: EventSink,
    ) -> Self {
        Self {
            runner,
            cache,
            artifacts,
            events,
        }
    }

    /// Run every step of `job` in declared order
    pub async fn execute(&self, job: &Job, context: &PipelineContext) -> JobReport {
        let context = context.for_job(&job.id);
        let started_at = Utc::now();
        let mut records = Vec::with_capacity(job.steps.len());
        let mut failure: Option<String> = None;
        let mut saves = Vec::new();

        info!("Executing job: {}", job.id);

        for step in &job.steps {
            if failure.is_some() && !step.always {
                debug!("Skipping step {} of job {} after earlier failure", step.id, job.id);
                self.events.emit(ExecutionEvent::StepSkipped {
                    job_id: job.id.clone(),
                    step_id: step.id.clone(),
                });
                records.push(StepRecord::skipped(&step.id));
                continue;
            }

            self.events.emit(ExecutionEvent::StepStarted {
                job_id: job.id.clone(),
                step_id: step.id.clone(),
                kind: step.kind(),
            });

            let start = Instant::now();
            let result = match &step.action {
                StepAction::Run { .. } => self.run_command(step, &context).await,
                StepAction::RestoreCache(spec) => {
                    let (result, save) = self.restore_cache(spec, &context).await;
                    saves.extend(save);
                    result
                }
                StepAction::Upload(spec) => self.upload(spec, &context).await,
            };

            let status = if result.success {
                StepStatus::Succeeded
            } else if step.continue_on_error {
                info!("Step {} of job {} failed, continuing (continue_on_error)", step.id, job.id);
                StepStatus::Tolerated
            } else {
                warn!("Step {} of job {} failed", step.id, job.id);
                StepStatus::Failed
            };

            if status == StepStatus::Failed && failure.is_none() {
                let reason = result
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("exit code {}", result.exit_code.unwrap_or(-1)));
                failure = Some(format!("step '{}' failed: {}", step.id, reason));
            }

            self.events.emit(ExecutionEvent::StepFinished {
                job_id: job.id.clone(),
                step_id: step.id.clone(),
                status,
                exit_code: result.exit_code,
                output: context.redact(&result.output),
            });

            records.push(StepRecord {
                step_id: step.id.clone(),
                status,
                exit_code: result.exit_code,
                attempts: result.attempts,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        if failure.is_none() {
            for save in saves {
                self.save_cache(save, &context).await;
            }
        }

        let status = if failure.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Succeeded
        };
        info!("Job {} finished: {:?}", job.id, status);

        JobReport {
            status,
            steps: records,
            error: failure,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn run_command(&self, step: &Step, context: &PipelineContext) -> StepResult {
        let chain = FallbackChain::new(self.runner.as_ref(), &self.events).execute(step, context).await;
        StepResult {
            success: chain.success(),
            exit_code: Some(chain.outcome.exit_code),
            output: chain.outcome.output_lossy(),
            attempts: chain.attempts,
            error: None,
        }
    }

    /// Restore never fails the step: every problem is a miss
    async fn restore_cache(
        &self,
        spec: &CacheSpec,
        context: &PipelineContext,
    ) -> (StepResult, Option<PendingSave>) {
        let job_id = context.current_job_id.clone().unwrap_or_default();
        let variables = context.get_rendering_variables();

        let key = match CacheKey::resolve(spec, &context.workspace, &context.platform, &variables) {
            Ok(key) => key,
            Err(e) => {
                warn!("Could not compute cache key for {}: {}", spec.path.display(), e);
                return (StepResult::ok(format!("cache key unavailable: {}", e)), None);
            }
        };
        let save = PendingSave {
            key: key.primary.clone(),
            path: spec.path.clone(),
        };

        let hit = match self.cache.restore(&key.candidates()).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Cache backend unavailable, treating as miss: {}", e);
                None
            }
        };

        let Some(hit) = hit else {
            info!("Cache miss for {}", key.primary);
            self.events.emit(ExecutionEvent::CacheMissed {
                job_id,
                key: key.primary.clone(),
            });
            return (StepResult::ok(format!("cache miss: {}", key.primary)), Some(save));
        };

        let workspace = context.workspace.clone();
        let blob = hit.blob;
        if let Err(e) = blocking(move || archive::unpack(&blob, &workspace)).await {
            warn!("Could not unpack cache entry {}, treating as miss: {}", hit.key, e);
            self.events.emit(ExecutionEvent::CacheMissed {
                job_id,
                key: key.primary.clone(),
            });
            return (StepResult::ok(format!("cache miss: {}", key.primary)), Some(save));
        }

        info!("Restored cache {} (exact: {})", hit.key, hit.exact);
        self.events.emit(ExecutionEvent::CacheRestored {
            job_id,
            key: hit.key.clone(),
            exact: hit.exact,
        });

        let output = format!("cache restored from {}", hit.key);
        (StepResult::ok(output), (!hit.exact).then_some(save))
    }

    async fn save_cache(&self, save: PendingSave, context: &PipelineContext) {
        let workspace = context.workspace.clone();
        if !workspace.join(&save.path).exists() {
            debug!("Nothing to cache at {}", save.path.display());
            return;
        }

        let path = save.path.clone();
        let blob = match blocking(move || archive::pack(&workspace, &path)).await {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Could not pack {} for caching: {}", save.path.display(), e);
                return;
            }
        };

        match self.cache.save(&save.key, blob).await {
            Ok(()) => {
                info!("Saved cache {}", save.key);
                self.events.emit(ExecutionEvent::CacheSaved {
                    job_id: context.current_job_id.clone().unwrap_or_default(),
                    key: save.key,
                });
            }
            Err(e) => warn!("Could not save cache {}: {}", save.key, e),
        }
    }

    async fn upload(&self, spec: &UploadSpec, context: &PipelineContext) -> StepResult {
        let job_id = context.current_job_id.clone().unwrap_or_default();
        let variables = context.get_rendering_variables();
        let name = render_template(&spec.name, &variables);
        let patterns: Vec<String> = spec
            .paths
            .iter()
            .map(|p| render_template(p, &variables))
            .collect();

        let workspace = context.workspace.clone();
        let files = blocking(move || {
            let mut files = Vec::new();
            for relative in collect_files(&workspace, &patterns)? {
                let contents = std::fs::read(workspace.join(&relative))?;
                files.push((relative.to_string_lossy().into_owned(), contents));
            }
            Ok(files)
        })
        .await;

        let files = match files {
            Ok(files) => files,
            Err(e) => return StepResult::failed(format!("could not collect files for '{}': {}", name, e)),
        };

        if files.is_empty() {
            let message = format!("no files found for artifact '{}'", name);
            return match spec.if_no_files_found {
                MissingFilesPolicy::Error => StepResult::failed(message),
                MissingFilesPolicy::Warn => {
                    warn!("{}", message);
                    StepResult::ok(message)
                }
                MissingFilesPolicy::Ignore => StepResult::ok(message),
            };
        }

        let count = files.len();
        let artifact = files
            .into_iter()
            .fold(Artifact::new(name.clone(), job_id.clone()), |artifact, (path, contents)| {
                artifact.with_file(path, contents)
            })
            .with_retention_days(spec.retention_days);

        match self.artifacts.upload(artifact).await {
            Ok(()) => {
                info!("Uploaded artifact {} ({} files)", name, count);
                self.events.emit(ExecutionEvent::ArtifactUploaded {
                    job_id,
                    name: name.clone(),
                    files: count,
                });
                StepResult::ok(format!("uploaded {} files as '{}'", count, name))
            }
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}
