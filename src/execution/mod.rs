//! Pipeline execution: scheduling jobs, running their steps, reporting events

pub mod engine;
pub mod events;
pub mod fallback;
pub mod job;
pub mod scheduler;

pub use engine::{EngineError, ExecutionEngine};
pub use events::{EventHandler, EventSink, ExecutionEvent};
pub use fallback::{ChainOutcome, FallbackChain};
pub use job::{JobExecutor, JobReport};
pub use scheduler::{ExecutionScheduler, SchedulingStrategy};
