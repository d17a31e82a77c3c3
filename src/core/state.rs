//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every job finished without failing
    Succeeded,
    /// At least one job failed
    Failed,
}

/// Terminal or in-flight status of a job, without the attached data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed | JobStatus::Skipped)
    }
}

/// State of a single job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobState {
    /// Job is waiting for its dependencies
    Pending,
    /// Job is currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Every blocking step succeeded
    Succeeded {
        steps: Vec<StepRecord>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// A blocking step failed
    Failed {
        error: String,
        steps: Vec<StepRecord>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Job never ran because of its dependencies
    Skipped {
        reason: String,
    },
}

impl JobState {
    /// Check if job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Running { .. } => JobStatus::Running,
            JobState::Succeeded { .. } => JobStatus::Succeeded,
            JobState::Failed { .. } => JobStatus::Failed,
            JobState::Skipped { .. } => JobStatus::Skipped,
        }
    }

    /// Step records of a finished job
    pub fn steps(&self) -> &[StepRecord] {
        match self {
            JobState::Succeeded { steps, .. } | JobState::Failed { steps, .. } => steps,
            _ => &[],
        }
    }
}

/// How a single step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Succeeded,
    /// Failed, but marked `continue_on_error`
    Tolerated,
    Failed,
    /// Not executed because an earlier step failed
    Skipped,
}

/// One command attempt inside a step (more than one when a fallback ran)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub step_id: String,
    pub exit_code: i32,
    pub success: bool,
}

/// Record of a step's execution, kept on the job state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub attempts: Vec<AttemptRecord>,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn skipped(step_id: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Skipped,
            exit_code: None,
            attempts: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished
    pub completed_at: Option<DateTime<Utc>>,

    pub total_jobs: usize,
    pub succeeded_jobs: usize,
    pub failed_jobs: usize,
    pub skipped_jobs: usize,
    pub running_jobs: usize,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            succeeded_jobs: 0,
            failed_jobs: 0,
            skipped_jobs: 0,
            running_jobs: 0,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_jobs: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_jobs = total_jobs;
    }

    /// Record the terminal status
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Recount job statuses
    pub fn update_counts(&mut self, statuses: impl Iterator<Item = JobStatus>) {
        let (mut succeeded, mut failed, mut skipped, mut running) = (0, 0, 0, 0);
        for status in statuses {
            match status {
                JobStatus::Succeeded => succeeded += 1,
                JobStatus::Failed => failed += 1,
                JobStatus::Skipped => skipped += 1,
                JobStatus::Running => running += 1,
                JobStatus::Pending => {}
            }
        }
        self.succeeded_jobs = succeeded;
        self.failed_jobs = failed;
        self.skipped_jobs = skipped;
        self.running_jobs = running;
    }

    /// Calculate progress percentage (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        (self.succeeded_jobs + self.failed_jobs + self.skipped_jobs) as f64 / self.total_jobs as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal status of every job after a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub jobs: BTreeMap<String, JobStatus>,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    pub fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.get(job_id).copied()
    }
}
