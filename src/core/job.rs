//! Job domain model

use crate::core::{
    config::{JobConfig, PipelineConfig},
    state::{JobState, JobStatus},
    step::{Step, StepDefaults},
};
use std::collections::HashMap;

/// A unit of scheduling: ordered steps sharing one workspace
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Ordered steps
    pub steps: Vec<Step>,

    /// Jobs this job depends on
    pub dependencies: Vec<String>,

    /// Start once dependencies are terminal, whatever their status
    pub run_always: bool,

    /// Runtime state
    pub state: JobState,
}

/// Whether a pending job can start, must be skipped, or has to keep waiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Skip(String),
    Waiting,
}

impl Job {
    /// Create a job from its config
    pub fn from_config(config: &JobConfig, pipeline: &PipelineConfig) -> Self {
        let mut env = pipeline.defaults.env.clone();
        env.extend(config.env.clone());

        let defaults = StepDefaults {
            timeout_secs: config
                .timeout_secs
                .or(pipeline.defaults.timeout_secs)
                .unwrap_or(StepDefaults::default().timeout_secs),
            env,
        };

        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| Step::from_config(step, index, &defaults))
            .collect();

        Job {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            steps,
            dependencies: config.needs.clone(),
            run_always: config.run_always,
            state: JobState::Pending,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// Decide what a pending job should do given its dependencies' statuses
    pub fn readiness(&self, statuses: &HashMap<String, JobStatus>) -> Readiness {
        let dep_statuses: Vec<(&String, JobStatus)> = self
            .dependencies
            .iter()
            .map(|dep| (dep, statuses.get(dep).copied().unwrap_or(JobStatus::Pending)))
            .collect();

        if self.run_always {
            return if dep_statuses.iter().all(|(_, s)| s.is_terminal()) {
                Readiness::Ready
            } else {
                Readiness::Waiting
            };
        }

        if let Some((dep, status)) = dep_statuses
            .iter()
            .find(|(_, s)| matches!(s, JobStatus::Failed | JobStatus::Skipped))
        {
            let verb = if *status == JobStatus::Failed { "failed" } else { "was skipped" };
            return Readiness::Skip(format!("dependency '{}' {}", dep, verb));
        }

        if dep_statuses.iter().all(|(_, s)| *s == JobStatus::Succeeded) {
            Readiness::Ready
        } else {
            Readiness::Waiting
        }
    }
}
