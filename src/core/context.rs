//! Pipeline context - workspace, variables and secrets shared by a run

use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Execution context for one job of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Identifier of the run
    pub execution_id: Uuid,

    /// Directory the steps run in (the checked-out source tree)
    pub workspace: PathBuf,

    /// Platform component of cache keys
    pub platform: String,

    /// Global and user-defined variables
    pub variables: HashMap<String, String>,

    /// Secret values by name
    secrets: HashMap<String, String>,

    /// The job being executed (if any)
    pub current_job_id: Option<String>,
}

impl PipelineContext {
    /// Create a context rooted at `workspace`
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            workspace: workspace.into(),
            platform: std::env::consts::OS.to_string(),
            variables: HashMap::new(),
            secrets: HashMap::new(),
            current_job_id: None,
        }
    }

    /// Set a variable
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Get a variable
    pub fn get_variable(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    /// Register a secret value
    pub fn set_secret(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.secrets.insert(name.into(), value.into());
    }

    /// Read the named secrets from the process environment; missing ones are left unset
    pub fn load_secrets_from_env(&mut self, names: &[String]) -> Vec<String> {
        let mut missing = Vec::new();
        for name in names {
            match std::env::var(name) {
                Ok(value) if !value.is_empty() => self.set_secret(name.clone(), value),
                _ => missing.push(name.clone()),
            }
        }
        missing
    }

    /// Context for a specific job
    pub fn for_job(&self, job_id: &str) -> Self {
        let mut ctx = self.clone();
        ctx.current_job_id = Some(job_id.to_string());
        ctx
    }

    /// Get all values available for template rendering
    pub fn get_rendering_variables(&self) -> HashMap<String, String> {
        let mut vars = self.variables.clone();

        vars.insert("os".to_string(), self.platform.clone());
        vars.insert("execution_id".to_string(), self.execution_id.to_string());
        vars.insert("workspace".to_string(), self.workspace.display().to_string());

        if let Some(ref job_id) = self.current_job_id {
            vars.insert("job.id".to_string(), job_id.clone());
        }

        for (name, value) in &self.secrets {
            vars.insert(format!("secrets.{}", name), value.clone());
        }

        vars
    }

    /// Replace every secret value in `text` with `***`
    ///
    /// Occurrences of all secrets are located in the original text first and
    /// overlapping spans merged, so a secret containing another is masked whole.
    pub fn redact(&self, text: &str) -> String {
        let mut spans: Vec<(usize, usize)> = self
            .secrets
            .values()
            .filter(|value| !value.is_empty())
            .flat_map(|value| text.match_indices(value.as_str()).map(|(start, m)| (start, start + m.len())))
            .collect();
        if spans.is_empty() {
            return text.to_string();
        }
        spans.sort_unstable();

        let mut redacted = String::with_capacity(text.len());
        let mut cursor = 0;
        let mut current = spans[0];
        for &(start, end) in &spans[1..] {
            if start <= current.1 {
                current.1 = current.1.max(end);
            } else {
                redacted.push_str(&text[cursor..current.0]);
                redacted.push_str("***");
                cursor = current.1;
                current = (start, end);
            }
        }
        redacted.push_str(&text[cursor..current.0]);
        redacted.push_str("***");
        redacted.push_str(&text[current.1..]);
        redacted
    }
}
