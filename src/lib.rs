//! jobgraph - a CI pipeline runner: dependency-ordered jobs, keyed caches,
//! artifacts and fallback steps

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runner;
pub mod store;

// Re-export commonly used types
pub use core::{ExecutionStatus, Job, JobStatus, Pipeline, PipelineContext, PipelineResult, Step};
pub use execution::{EngineError, ExecutionEngine, ExecutionEvent, SchedulingStrategy};
pub use runner::{Outcome, ShellTaskRunner, Task, TaskRunner};
pub use store::{ArtifactStore, CacheStore};
