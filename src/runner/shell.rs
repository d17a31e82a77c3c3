//! Shell task runner - runs step scripts through `sh -c`

use crate::runner::{Outcome, Task, TaskRunner, NO_EXIT_CODE};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Configuration for the shell runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Shell executable
    pub shell: String,

    /// Arguments placed before the script
    pub shell_args: Vec<String>,

    /// Do not inherit the parent's environment
    pub clear_env: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            shell_args: vec!["-c".to_string()],
            clear_env: false,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(mut self, shell: impl Into<String>, args: Vec<String>) -> Self {
        self.shell = shell.into();
        self.shell_args = args;
        self
    }

    pub fn with_clear_env(mut self, clear_env: bool) -> Self {
        self.clear_env = clear_env;
        self
    }
}

/// Runs each task as a shell subprocess
#[derive(Debug, Clone, Default)]
pub struct ShellTaskRunner {
    config: RunnerConfig,
}

impl ShellTaskRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn shell(&self) -> &str {
        &self.config.shell
    }
}

#[async_trait]
impl TaskRunner for ShellTaskRunner {
    async fn run(&self, task: &Task) -> Outcome {
        debug!(
            "Spawning {} for step {} in {}",
            self.config.shell,
            task.step_id,
            task.working_dir.display()
        );

        let mut command = Command::new(&self.config.shell);
        command
            .args(&self.config.shell_args)
            .arg(&task.script)
            .current_dir(&task.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if self.config.clear_env {
            command.env_clear();
        }
        command.envs(&task.env);

        let result = timeout(Duration::from_secs(task.timeout_secs), command.output()).await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Failed to spawn command for step {}: {}", task.step_id, e);
                return Outcome::failure(
                    NO_EXIT_CODE,
                    format!("failed to spawn {}: {}", self.config.shell, e),
                );
            }
            Err(_) => {
                warn!("Step {} timed out after {}s", task.step_id, task.timeout_secs);
                return Outcome::failure(
                    NO_EXIT_CODE,
                    format!("timed out after {} seconds", task.timeout_secs),
                );
            }
        };

        let exit_code = output.status.code().unwrap_or(NO_EXIT_CODE);
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        debug!(
            "Step {} exited with code {} ({} bytes of output)",
            task.step_id,
            exit_code,
            combined.len()
        );

        if output.status.success() {
            Outcome::success(combined)
        } else {
            Outcome::failure(exit_code, combined)
        }
    }
}
