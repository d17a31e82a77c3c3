//! Core domain models for jobgraph
//!
//! This module defines the fundamental data structures that represent
//! pipelines, jobs, steps, and their configuration.

pub mod cache_key;
pub mod config;
pub mod context;
pub mod job;
pub mod pipeline;
pub mod state;
pub mod step;

pub use cache_key::*;
pub use context::*;
pub use job::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
