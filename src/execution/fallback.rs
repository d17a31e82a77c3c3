//! Fallback chain - run a command, and its alternatives until one succeeds

use crate::{
    core::{AttemptRecord, PipelineContext, Step},
    execution::events::{EventSink, ExecutionEvent},
    runner::{Outcome, Task, TaskRunner, NO_EXIT_CODE},
};
use tracing::{info, warn};

/// Result of running a step's alternatives
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// Outcome of the first success, or of the last failure
    pub outcome: Outcome,

    /// Every attempt in order
    pub attempts: Vec<AttemptRecord>,
}

impl ChainOutcome {
    pub fn success(&self) -> bool {
        self.outcome.success
    }
}

/// Build the runner task for a `run` step
pub fn task_for(step: &Step, context: &PipelineContext) -> Option<Task> {
    let variables = context.get_rendering_variables();
    let script = step.render_script(&variables)?;

    let working_dir = match &step.working_directory {
        Some(dir) => context.workspace.join(dir),
        None => context.workspace.clone(),
    };

    Some(Task {
        step_id: step.id.clone(),
        script,
        env: step.render_env(&variables),
        working_dir,
        timeout_secs: step.timeout_secs,
    })
}

/// Runs a step and then its fallbacks, stopping at the first success
pub struct FallbackChain<'a, R: ?Sized> {
    runner: &'a R,
    events: &'a EventSink,
}

impl<'a, R: TaskRunner + ?Sized> FallbackChain<'a, R> {
    pub fn new(runner: &'a R, events: &'a EventSink) -> Self {
        Self { runner, events }
    }

    pub async fn execute(&self, step: &Step, context: &PipelineContext) -> ChainOutcome {
        let job_id = context.current_job_id.clone().unwrap_or_default();
        let mut attempts = Vec::new();
        let mut last = Outcome::failure(NO_EXIT_CODE, format!("step {} has no command", step.id));
        let mut previous: Option<&Step> = None;

        for alternative in step.alternatives() {
            let Some(task) = task_for(alternative, context) else {
                warn!("Step {} is not a command, skipping it in the chain", alternative.id);
                continue;
            };

            if let Some(prev) = previous {
                info!("Step {} failed, falling back to {}", prev.id, alternative.id);
                self.events.emit(ExecutionEvent::FallbackTriggered {
                    job_id: job_id.clone(),
                    from_step: prev.id.clone(),
                    to_step: alternative.id.clone(),
                });
            }

            let outcome = self.runner.run(&task).await;
            attempts.push(AttemptRecord {
                step_id: alternative.id.clone(),
                exit_code: outcome.exit_code,
                success: outcome.success,
            });

            if outcome.success {
                return ChainOutcome { outcome, attempts };
            }

            last = outcome;
            previous = Some(alternative);
        }

        ChainOutcome { outcome: last, attempts }
    }
}
