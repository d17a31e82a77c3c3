//! Step domain model

use crate::core::config::{MissingFilesPolicy, StepConfig};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;

/// A single step in a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Step identifier, unique within its job
    pub id: String,

    /// Display name
    pub name: String,

    /// What the step does
    pub action: StepAction,

    /// A failure is recorded but does not fail the job
    pub continue_on_error: bool,

    /// Runs even after an earlier step in the job failed
    pub always: bool,

    /// Alternative run when this step fails
    pub fallback: Option<Box<Step>>,

    /// Environment for this step (templates unrendered)
    pub env: BTreeMap<String, String>,

    /// Working directory relative to the workspace
    pub working_directory: Option<PathBuf>,

    /// Timeout in seconds
    pub timeout_secs: u64,
}

/// The work a step performs
#[derive(Debug, Clone)]
pub enum StepAction {
    /// Opaque shell script
    Run { script: String },
    /// Restore a keyed cache into the workspace
    RestoreCache(CacheSpec),
    /// Upload matching files as a named artifact
    Upload(UploadSpec),
}

/// Where a cache lives in the workspace and how its key is derived
#[derive(Debug, Clone)]
pub struct CacheSpec {
    pub path: PathBuf,
    pub prefix: String,
    pub hash_files: Vec<String>,
    pub restore_keys: Vec<String>,
}

/// Files to collect into an artifact
#[derive(Debug, Clone)]
pub struct UploadSpec {
    pub name: String,
    pub paths: Vec<String>,
    pub retention_days: Option<u32>,
    pub if_no_files_found: MissingFilesPolicy,
}

/// Values inherited from the job and pipeline
#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
    pub env: BTreeMap<String, String>,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 3600, // 1 hour
            env: BTreeMap::new(),
        }
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Replace `{{ name }}` placeholders; unknown names are left untouched
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, index: usize, defaults: &StepDefaults) -> Self {
        let id = config.resolved_id(index);
        Self::build(id, config, defaults)
    }

    fn build(id: String, config: &StepConfig, defaults: &StepDefaults) -> Self {
        let action = if let Some(cache) = &config.cache {
            StepAction::RestoreCache(CacheSpec {
                path: PathBuf::from(&cache.path),
                prefix: cache.prefix.clone(),
                hash_files: cache.hash_files.clone(),
                restore_keys: cache.restore_keys.clone(),
            })
        } else if let Some(upload) = &config.upload {
            StepAction::Upload(UploadSpec {
                name: upload.name.clone(),
                paths: upload.paths.clone(),
                retention_days: upload.retention_days,
                if_no_files_found: upload.if_no_files_found,
            })
        } else {
            StepAction::Run {
                script: config.run.clone().unwrap_or_default(),
            }
        };

        let fallback = config
            .fallback
            .as_ref()
            .map(|fb| {
                let fallback_id = fb.id.clone().unwrap_or_else(|| format!("{}-fallback", id));
                Box::new(Self::build(fallback_id, fb, defaults))
            });

        let mut env = defaults.env.clone();
        env.extend(config.env.clone());

        Step {
            name: config.name.clone().unwrap_or_else(|| id.clone()),
            id,
            action,
            continue_on_error: config.continue_on_error,
            always: config.always,
            fallback,
            env,
            working_directory: config.working_directory.as_ref().map(PathBuf::from),
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
        }
    }

    /// The step followed by its chain of fallbacks, in execution order
    pub fn alternatives(&self) -> Vec<&Step> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(next) = current.fallback.as_deref() {
            chain.push(next);
            current = next;
        }
        chain
    }

    /// Render the script with variable substitution
    pub fn render_script(&self, variables: &HashMap<String, String>) -> Option<String> {
        match &self.action {
            StepAction::Run { script } => Some(render_template(script, variables)),
            _ => None,
        }
    }

    /// Render the step environment with variable substitution
    pub fn render_env(&self, variables: &HashMap<String, String>) -> BTreeMap<String, String> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), render_template(v, variables)))
            .collect()
    }

    /// Short description used in logs and events
    pub fn kind(&self) -> &'static str {
        match self.action {
            StepAction::Run { .. } => "run",
            StepAction::RestoreCache(_) => "cache",
            StepAction::Upload(_) => "upload",
        }
    }
}
