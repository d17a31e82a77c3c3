//! Artifact store: named file sets uploaded by jobs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

/// Error types for artifact backends
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact '{0}' was already uploaded in this run")]
    AlreadyExists(String),

    #[error("invalid artifact path: {0}")]
    InvalidPath(String),

    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt artifact metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// A named set of files produced by a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,

    /// Job that uploaded it
    pub job_id: String,

    /// Relative path -> contents
    pub files: BTreeMap<String, Vec<u8>>,

    /// Retention window in days; recorded, never enforced
    pub retention_days: Option<u32>,

    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            job_id: job_id.into(),
            files: BTreeMap::new(),
            retention_days: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    pub fn with_retention_days(mut self, days: Option<u32>) -> Self {
        self.retention_days = days;
        self
    }

    /// Total size of all files in bytes
    pub fn size(&self) -> u64 {
        self.files.values().map(|f| f.len() as u64).sum()
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            name: self.name.clone(),
            job_id: self.job_id.clone(),
            files: self.files.keys().cloned().collect(),
            size: self.size(),
            retention_days: self.retention_days,
            created_at: self.created_at,
        }
    }
}

/// Artifact metadata without file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub name: String,
    pub job_id: String,
    pub files: Vec<String>,
    pub size: u64,
    pub retention_days: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Trait for artifact backends
///
/// Artifacts are write-once per run: uploading a name twice is an error.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn upload(&self, artifact: Artifact) -> Result<(), ArtifactError>;

    async fn get(&self, name: &str) -> Result<Option<Artifact>, ArtifactError>;

    async fn list(&self) -> Result<Vec<ArtifactSummary>, ArtifactError>;
}

fn validate_name(name: &str) -> Result<(), ArtifactError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(ArtifactError::InvalidPath(name.to_string()));
    }
    Ok(())
}

fn validate_relative(path: &str) -> Result<(), ArtifactError> {
    let ok = !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if ok {
        Ok(())
    } else {
        Err(ArtifactError::InvalidPath(path.to_string()))
    }
}

/// In-memory artifact store (for testing or ephemeral use)
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<String, Artifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.artifacts.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn upload(&self, artifact: Artifact) -> Result<(), ArtifactError> {
        validate_name(&artifact.name)?;
        for path in artifact.files.keys() {
            validate_relative(path)?;
        }

        let mut artifacts = self.artifacts.write().await;
        if artifacts.contains_key(&artifact.name) {
            return Err(ArtifactError::AlreadyExists(artifact.name));
        }
        artifacts.insert(artifact.name.clone(), artifact);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Artifact>, ArtifactError> {
        Ok(self.artifacts.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<ArtifactSummary>, ArtifactError> {
        let artifacts = self.artifacts.read().await;
        let mut summaries: Vec<_> = artifacts.values().map(Artifact::summary).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}

const STAGING_DIR: &str = ".staging";

async fn write_artifact(dir: &Path, artifact: &Artifact) -> Result<(), ArtifactError> {
    let files_dir = dir.join("files");
    tokio::fs::create_dir_all(&files_dir).await?;
    for (path, contents) in &artifact.files {
        let target = files_dir.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, contents).await?;
    }

    let metadata = serde_json::to_vec_pretty(&artifact.summary())?;
    tokio::fs::write(dir.join("artifact.json"), metadata).await?;
    Ok(())
}

/// Directory-backed store: `<root>/<name>/artifact.json` plus `<root>/<name>/files/...`
///
/// Uploads are assembled under `<root>/.staging/` and renamed into place once
/// complete, so a failed upload leaves nothing behind.
pub struct FsArtifactStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Parent of the per-run artifact directories: `<data dir>/jobgraph/artifacts`
    pub fn default_root() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jobgraph")
            .join("artifacts")
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join("artifact.json")
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn upload(&self, artifact: Artifact) -> Result<(), ArtifactError> {
        validate_name(&artifact.name)?;
        for path in artifact.files.keys() {
            validate_relative(path)?;
        }

        let _guard = self.write_lock.lock().await;
        let dir = self.root.join(&artifact.name);
        if tokio::fs::try_exists(&dir).await? {
            return Err(ArtifactError::AlreadyExists(artifact.name));
        }

        let staging = self
            .root
            .join(STAGING_DIR)
            .join(format!("{}-{}", artifact.name, Uuid::new_v4()));
        if let Err(e) = write_artifact(&staging, &artifact).await {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&staging).await {
                warn!("Could not remove partial upload {}: {}", staging.display(), cleanup);
            }
            return Err(e);
        }

        tokio::fs::rename(&staging, &dir).await?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Artifact>, ArtifactError> {
        validate_name(name)?;
        let bytes = match tokio::fs::read(self.metadata_path(name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let summary: ArtifactSummary = serde_json::from_slice(&bytes)?;

        let files_dir = self.root.join(name).join("files");
        let mut files = BTreeMap::new();
        for path in &summary.files {
            files.insert(path.clone(), tokio::fs::read(files_dir.join(path)).await?);
        }

        Ok(Some(Artifact {
            name: summary.name,
            job_id: summary.job_id,
            files,
            retention_days: summary.retention_days,
            created_at: summary.created_at,
        }))
    }

    async fn list(&self) -> Result<Vec<ArtifactSummary>, ArtifactError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let metadata_path = entry.path().join("artifact.json");
            match tokio::fs::read(&metadata_path).await {
                Ok(bytes) => summaries.push(serde_json::from_slice::<ArtifactSummary>(&bytes)?),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}
