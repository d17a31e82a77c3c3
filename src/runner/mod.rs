//! Task runner: executes one opaque command and reports its outcome

pub mod shell;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use shell::{RunnerConfig, ShellTaskRunner};

/// Exit code reported when a command could not be spawned or timed out
pub const NO_EXIT_CODE: i32 = -1;

/// One command invocation
#[derive(Debug, Clone)]
pub struct Task {
    /// Step the command belongs to (for logging)
    pub step_id: String,

    /// Script handed to the shell
    pub script: String,

    /// Extra environment variables
    pub env: BTreeMap<String, String>,

    /// Directory the command runs in
    pub working_dir: PathBuf,

    /// Timeout in seconds
    pub timeout_secs: u64,
}

impl Task {
    pub fn new(step_id: impl Into<String>, script: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            step_id: step_id.into(),
            script: script.into(),
            env: BTreeMap::new(),
            working_dir: working_dir.into(),
            timeout_secs: 3600,
        }
    }
}

/// Result of one task run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether the command exited with status 0
    pub success: bool,

    /// Combined stdout followed by stderr
    pub output: Vec<u8>,

    /// Process exit code, `NO_EXIT_CODE` if there was none
    pub exit_code: i32,
}

impl Outcome {
    pub fn success(output: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            output: output.into(),
            exit_code: 0,
        }
    }

    pub fn failure(exit_code: i32, output: impl Into<Vec<u8>>) -> Self {
        Self {
            success: false,
            output: output.into(),
            exit_code,
        }
    }

    /// Output decoded as UTF-8, replacing invalid sequences
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Trait for task execution - allows for different implementations
///
/// Implementations never fail: spawn errors and timeouts are reported as a
/// failing [`Outcome`], and the caller decides what a failure means.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &Task) -> Outcome;
}
