//! CLI command definitions

use crate::execution::SchedulingStrategy;
use crate::runner::RunnerConfig;
use clap::Args;
use std::path::PathBuf;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub variable: Vec<(String, String)>,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Maximum concurrent jobs for `parallel-limited`
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Directory the steps run in (defaults to the current directory)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Cache store directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Artifact store directory (a subdirectory per run is created)
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,

    /// Print the output of failed steps
    #[arg(long)]
    pub show_output: bool,

    /// Shell that runs step scripts (invoked as `<shell> -c <script>`)
    #[arg(long, default_value = "sh")]
    pub shell: String,

    /// Run steps without inheriting this process's environment
    #[arg(long)]
    pub clean_env: bool,

    /// Drop cache entries not saved for this many days
    #[arg(long, default_value_t = 7)]
    pub cache_max_age_days: u32,
}

impl RunCommand {
    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match self.strategy {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(self.max_parallel),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::new()
            .with_shell(self.shell.clone(), vec!["-c".to_string()])
            .with_clear_env(self.clean_env)
    }
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show the job graph of a pipeline
#[derive(Debug, Args, Clone)]
pub struct GraphCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,
}

/// List pipelines found in history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show execution counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific execution (with `--verbose`, every field)
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("python_version=3.12").unwrap(),
            ("python_version".to_string(), "3.12".to_string())
        );
        assert_eq!(parse_key_value("flags=a=b").unwrap().1, "a=b");
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
