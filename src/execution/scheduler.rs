//! Execution scheduler - determines which jobs to start next

use crate::core::Pipeline;

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Execute jobs in dependency order, one at a time
    Sequential,

    /// Start every ready job at once
    #[default]
    Parallel,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

impl SchedulingStrategy {
    /// Maximum number of jobs running at the same time, `None` if unbounded
    pub fn max_concurrent(&self) -> Option<usize> {
        match self {
            SchedulingStrategy::Sequential => Some(1),
            SchedulingStrategy::Parallel => None,
            SchedulingStrategy::LimitedParallel(max) => Some((*max).max(1)),
        }
    }
}

/// Scheduler for determining which jobs to run
#[derive(Debug, Clone, Default)]
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
}

impl ExecutionScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    /// Ready jobs to start now, in execution order, honoring the concurrency limit
    pub fn next_jobs(&self, pipeline: &Pipeline) -> Vec<String> {
        let ready = pipeline.ready_jobs().into_iter().map(|j| j.id.clone());

        match self.strategy.max_concurrent() {
            None => ready.collect(),
            Some(max) => {
                let remaining = max.saturating_sub(pipeline.running_jobs().len());
                ready.take(remaining).collect()
            }
        }
    }
}
