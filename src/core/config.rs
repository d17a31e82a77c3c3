//! Pipeline configuration from YAML

use crate::core::Pipeline;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Pipeline version (optional)
    #[serde(default)]
    pub version: Option<String>,

    /// Global variables available to all steps
    #[serde(default)]
    variables: HashMap<String, Value>,

    /// Names of secrets read from the process environment at run start
    #[serde(default)]
    pub secrets: Vec<String>,

    /// Defaults applied to every job and step
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Pipeline jobs
    pub jobs: Vec<JobConfig>,
}

/// Pipeline-wide defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default step timeout (in seconds)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Environment shared by every step
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job identifier
    pub id: String,

    /// Human-readable job name
    #[serde(default)]
    pub name: Option<String>,

    /// Jobs that must succeed before this one starts
    #[serde(default, alias = "depends_on")]
    pub needs: Vec<String>,

    /// Run even when a dependency failed or was skipped
    #[serde(default)]
    pub run_always: bool,

    /// Environment shared by the job's steps
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Step timeout for this job (overrides the pipeline default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Ordered steps
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
///
/// Exactly one of `run`, `cache` or `upload` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step identifier, unique within its job (defaults to `step-<n>`)
    #[serde(default)]
    pub id: Option<String>,

    /// Human-readable step name
    #[serde(default)]
    pub name: Option<String>,

    /// Shell script to run
    #[serde(default)]
    pub run: Option<String>,

    /// Restore a keyed cache into the workspace
    #[serde(default)]
    pub cache: Option<CacheConfig>,

    /// Upload files as a named artifact
    #[serde(default)]
    pub upload: Option<UploadConfig>,

    /// A failure is recorded but does not fail the job
    #[serde(default)]
    pub continue_on_error: bool,

    /// Run even after an earlier step failed
    #[serde(default)]
    pub always: bool,

    /// Step to run when this one fails
    #[serde(default)]
    pub fallback: Option<Box<StepConfig>>,

    /// Extra environment for this step
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory relative to the workspace
    #[serde(default)]
    pub working_directory: Option<String>,

    /// Timeout for this step (overrides job and pipeline)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Cache restore configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path (relative to the workspace) to restore into and save from
    pub path: String,

    /// Key prefix, e.g. "pip"
    pub prefix: String,

    /// Manifest files whose contents are hashed into the key
    #[serde(default)]
    pub hash_files: Vec<String>,

    /// Additional restore keys tried after the primary key
    #[serde(default)]
    pub restore_keys: Vec<String>,
}

/// Artifact upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Artifact name, unique per run
    pub name: String,

    /// Glob patterns relative to the workspace
    pub paths: Vec<String>,

    /// Retention window in days (recorded only)
    #[serde(default)]
    pub retention_days: Option<u32>,

    /// What to do when no file matches
    #[serde(default)]
    pub if_no_files_found: MissingFilesPolicy,
}

/// Behaviour of an upload step that matched no files
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingFilesPolicy {
    /// Log a warning, the step succeeds
    #[default]
    Warn,
    /// The step fails
    Error,
    /// Silently succeed
    Ignore,
}

impl StepConfig {
    /// Step ID, falling back to its 1-based position in the job
    pub fn resolved_id(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("step-{}", index + 1))
    }

    fn action_count(&self) -> usize {
        [self.run.is_some(), self.cache.is_some(), self.upload.is_some()]
            .iter()
            .filter(|set| **set)
            .count()
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            anyhow::bail!("Pipeline '{}' defines no jobs", self.name);
        }

        let mut seen_ids = HashSet::new();
        for job in &self.jobs {
            if !seen_ids.insert(&job.id) {
                anyhow::bail!("Duplicate job ID: {}", job.id);
            }
        }

        for job in &self.jobs {
            for dep in &job.needs {
                if !seen_ids.contains(dep) {
                    anyhow::bail!("Job '{}' needs non-existent job '{}'", job.id, dep);
                }
                if dep == &job.id {
                    anyhow::bail!("Job '{}' needs itself", job.id);
                }
            }

            if job.steps.is_empty() {
                anyhow::bail!("Job '{}' has no steps", job.id);
            }

            let mut step_ids = HashSet::new();
            for (index, step) in job.steps.iter().enumerate() {
                let step_id = step.resolved_id(index);
                if !step_ids.insert(step_id.clone()) {
                    anyhow::bail!("Job '{}' has duplicate step ID: {}", job.id, step_id);
                }
                Self::validate_step(&job.id, &step_id, step)?;
            }
        }

        self.check_cycles()?;

        Ok(())
    }

    fn validate_step(job_id: &str, step_id: &str, step: &StepConfig) -> Result<()> {
        match step.action_count() {
            1 => {}
            0 => anyhow::bail!(
                "Step '{}' in job '{}' needs one of 'run', 'cache' or 'upload'",
                step_id,
                job_id
            ),
            _ => anyhow::bail!(
                "Step '{}' in job '{}' sets more than one of 'run', 'cache' and 'upload'",
                step_id,
                job_id
            ),
        }

        if let Some(upload) = &step.upload {
            if upload.paths.is_empty() {
                anyhow::bail!("Upload step '{}' in job '{}' has no paths", step_id, job_id);
            }
        }

        if let Some(fallback) = &step.fallback {
            if step.run.is_none() {
                anyhow::bail!(
                    "Step '{}' in job '{}' has a fallback but is not a 'run' step",
                    step_id,
                    job_id
                );
            }
            if fallback.run.is_none() || fallback.action_count() != 1 {
                anyhow::bail!(
                    "Fallback of step '{}' in job '{}' must be a 'run' step",
                    step_id,
                    job_id
                );
            }
            Self::validate_step(job_id, &format!("{}-fallback", step_id), fallback)?;
        }

        Ok(())
    }

    /// Check for cycles in the job dependency graph
    fn check_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for job in &self.jobs {
            if !visited.contains(&job.id) {
                self.dfs_check(&job.id, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        job_id: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<()> {
        visited.insert(job_id.to_string());
        recursion_stack.insert(job_id.to_string());

        if let Some(job) = self.jobs.iter().find(|j| j.id == job_id) {
            for dep in &job.needs {
                if recursion_stack.contains(dep) {
                    anyhow::bail!("Cycle detected in dependency graph involving job '{}'", dep);
                }
                if !visited.contains(dep) {
                    self.dfs_check(dep, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(job_id);
        Ok(())
    }

    /// Variables rendered as strings (numbers and booleans keep their YAML spelling)
    pub fn variables_as_string_map(&self) -> HashMap<String, String> {
        self.variables
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Null => String::new(),
                    other => serde_yaml::to_string(other)
                        .unwrap_or_default()
                        .trim_end()
                        .to_string(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline::from_config(self)
    }
}
