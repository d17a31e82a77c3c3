//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    job::{Job, Readiness},
    state::{ExecutionStatus, JobState, JobStatus, PipelineResult, PipelineState},
};
use std::collections::{HashMap, HashSet};

/// A pipeline definition: the job graph plus its run state
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Global variables available to all steps
    pub variables: HashMap<String, String>,

    /// Secret names to read from the environment
    pub secrets: Vec<String>,

    /// Pipeline jobs
    pub jobs: HashMap<String, Job>,

    /// Execution state
    pub state: PipelineState,

    /// Job execution order (topological sort)
    execution_order: Vec<String>,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        let jobs: HashMap<String, Job> = config
            .jobs
            .iter()
            .map(|job_config| {
                let job = Job::from_config(job_config, config);
                (job.id.clone(), job)
            })
            .collect();

        let execution_order = Self::topological_sort(&jobs);

        Pipeline {
            name: config.name.clone(),
            variables: config.variables_as_string_map(),
            secrets: config.secrets.clone(),
            jobs,
            state: PipelineState::new(),
            execution_order,
        }
    }

    /// Get a job by ID
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Get a mutable job by ID
    pub fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    /// Current status of every job
    pub fn statuses(&self) -> HashMap<String, JobStatus> {
        self.jobs
            .values()
            .map(|job| (job.id.clone(), job.status()))
            .collect()
    }

    /// Pending jobs whose dependencies all succeeded (or are terminal, for `run_always`),
    /// in execution order
    pub fn ready_jobs(&self) -> Vec<&Job> {
        let statuses = self.statuses();
        self.execution_order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|job| {
                matches!(job.state, JobState::Pending)
                    && job.readiness(&statuses) == Readiness::Ready
            })
            .collect()
    }

    /// Pending jobs that can never run, with the reason
    pub fn jobs_to_skip(&self) -> Vec<(String, String)> {
        let statuses = self.statuses();
        self.execution_order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|job| matches!(job.state, JobState::Pending))
            .filter_map(|job| match job.readiness(&statuses) {
                Readiness::Skip(reason) => Some((job.id.clone(), reason)),
                _ => None,
            })
            .collect()
    }

    /// Get all currently running jobs
    pub fn running_jobs(&self) -> Vec<&Job> {
        self.jobs
            .values()
            .filter(|j| matches!(j.state, JobState::Running { .. }))
            .collect()
    }

    /// Check if every job reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.jobs.values().all(|j| j.state.is_terminal())
    }

    /// Check if any job failed
    pub fn has_failed(&self) -> bool {
        self.jobs.values().any(|j| j.status() == JobStatus::Failed)
    }

    /// Get execution order (topological sort)
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Group jobs into stages: every job sits one stage after its deepest dependency
    pub fn stages(&self) -> Vec<Vec<String>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        for id in &self.execution_order {
            let level = self
                .jobs
                .get(id)
                .map(|job| {
                    job.dependencies
                        .iter()
                        .filter_map(|dep| depth.get(dep.as_str()))
                        .map(|d| d + 1)
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            depth.insert(id.as_str(), level);
        }

        let mut stages: Vec<Vec<String>> = Vec::new();
        for id in &self.execution_order {
            let level = depth[id.as_str()];
            if stages.len() <= level {
                stages.resize_with(level + 1, Vec::new);
            }
            stages[level].push(id.clone());
        }
        stages
    }

    /// Overall status derived from job statuses
    pub fn overall_status(&self) -> ExecutionStatus {
        if self.has_failed() {
            ExecutionStatus::Failed
        } else if self.is_complete() {
            ExecutionStatus::Succeeded
        } else {
            self.state.status
        }
    }

    /// Snapshot of terminal job statuses
    pub fn result(&self) -> PipelineResult {
        PipelineResult {
            execution_id: self.state.execution_id,
            status: self.overall_status(),
            jobs: self
                .jobs
                .values()
                .map(|job| (job.id.clone(), job.status()))
                .collect(),
        }
    }

    /// Calculate topological sort of jobs based on dependencies
    fn topological_sort(jobs: &HashMap<String, Job>) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();

        // Sort for deterministic order
        let mut job_ids: Vec<_> = jobs.keys().cloned().collect();
        job_ids.sort();

        for job_id in job_ids {
            if !visited.contains(&job_id) {
                Self::visit(&job_id, jobs, &mut visited, &mut result);
            }
        }

        result
    }

    fn visit(
        job_id: &str,
        jobs: &HashMap<String, Job>,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(job_id.to_string()) {
            return;
        }

        if let Some(job) = jobs.get(job_id) {
            let mut deps = job.dependencies.clone();
            deps.sort();
            for dep in &deps {
                Self::visit(dep, jobs, visited, result);
            }
        }

        result.push(job_id.to_string());
    }
}
