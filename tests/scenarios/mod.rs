//! Scenario-based tests for jobgraph

mod cache_backend;
mod dependency_gating;
mod fallback_steps;
mod python_ci;
mod shell_end_to_end;
mod step_semantics;
