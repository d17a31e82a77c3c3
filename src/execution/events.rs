//! Execution events - what the engine reports while a pipeline runs

use crate::core::{ExecutionStatus, JobStatus, StepStatus};
use std::sync::Arc;
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_jobs: usize,
    },
    JobStarted {
        job_id: String,
    },
    JobSkipped {
        job_id: String,
        reason: String,
    },
    StepStarted {
        job_id: String,
        step_id: String,
        kind: &'static str,
    },
    StepFinished {
        job_id: String,
        step_id: String,
        status: StepStatus,
        exit_code: Option<i32>,
        /// Combined output of the last attempt, secrets redacted
        output: String,
    },
    StepSkipped {
        job_id: String,
        step_id: String,
    },
    FallbackTriggered {
        job_id: String,
        from_step: String,
        to_step: String,
    },
    CacheRestored {
        job_id: String,
        key: String,
        exact: bool,
    },
    CacheMissed {
        job_id: String,
        key: String,
    },
    CacheSaved {
        job_id: String,
        key: String,
    },
    ArtifactUploaded {
        job_id: String,
        name: String,
        files: usize,
    },
    JobFinished {
        job_id: String,
        status: JobStatus,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of events to every registered handler
///
/// Cloned into each running job; handlers are called on the emitting task.
#[derive(Clone, Default)]
pub struct EventSink {
    handlers: Vec<EventHandler>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    pub fn emit(&self, event: ExecutionEvent) {
        for handler in &self.handlers {
            handler(event.clone());
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
