//! Cache store: keyed blobs that outlive a pipeline run

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Error types for cache backends
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt cache index: {0}")]
    Index(#[from] serde_json::Error),
}

/// A successful restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    /// Stored key that was found
    pub key: String,

    /// Whether it equals the first (most specific) requested key
    pub exact: bool,

    pub blob: Vec<u8>,
}

/// Trait for cache backends
///
/// A miss is `Ok(None)`; errors mean the backend itself is unavailable and
/// callers treat them as a miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Try `keys` in order; each matches a stored key exactly or as a prefix (newest wins)
    async fn restore(&self, keys: &[String]) -> Result<Option<CacheHit>, CacheError>;

    /// Store `blob` under `key`, replacing any previous value
    async fn save(&self, key: &str, blob: Vec<u8>) -> Result<(), CacheError>;
}

/// Pick the stored key matching the first satisfiable candidate
pub fn select_key<'a, I>(candidates: &[String], stored: I) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, DateTime<Utc>)>,
{
    let stored: Vec<(&str, DateTime<Utc>)> = stored.into_iter().collect();

    for candidate in candidates {
        if stored.iter().any(|(key, _)| *key == candidate.as_str()) {
            return Some(candidate.clone());
        }
        let newest = stored
            .iter()
            .filter(|(key, _)| key.starts_with(candidate.as_str()))
            .max_by_key(|(_, saved_at)| *saved_at);
        if let Some((key, _)) = newest {
            return Some((*key).to_string());
        }
    }

    None
}

fn is_exact(candidates: &[String], key: &str) -> bool {
    candidates.first().is_some_and(|first| first == key)
}

/// In-memory cache (for testing or ephemeral use)
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn restore(&self, keys: &[String]) -> Result<Option<CacheHit>, CacheError> {
        let entries = self.entries.read().await;
        let selected = select_key(keys, entries.iter().map(|(k, (_, at))| (k.as_str(), *at)));

        Ok(selected.and_then(|key| {
            entries.get(&key).map(|(blob, _)| CacheHit {
                exact: is_exact(keys, &key),
                blob: blob.clone(),
                key,
            })
        }))
    }

    async fn save(&self, key: &str, blob: Vec<u8>) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (blob, Utc::now()));
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    size: u64,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    entries: BTreeMap<String, IndexEntry>,
}

/// Directory-backed cache: `index.json` plus one blob file per key
///
/// Each save drops entries older than `max_age` (when set) and blob files the
/// index no longer references. An unreadable index counts as empty.
pub struct FsCacheStore {
    root: PathBuf,
    max_age: Option<Duration>,
    write_lock: Mutex<()>,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_age: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Create store under the user's cache directory
    pub fn with_default_path() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(cache_dir.join("jobgraph").join("cache"))
    }

    /// Evict entries not saved within `max_age`
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    fn blob_name(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        format!("{}.blob", hex::encode(&digest[..16]))
    }

    async fn read_index(&self) -> Result<CacheIndex, CacheError> {
        match tokio::fs::read(self.index_path()).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(index) => Ok(index),
                Err(e) => {
                    warn!("Ignoring corrupt cache index {}: {}", self.index_path().display(), e);
                    Ok(CacheIndex::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop expired entries, then delete blob files nothing references
    async fn prune(&self, index: &mut CacheIndex, keep: &str) -> Result<(), CacheError> {
        if let Some(max_age) = self.max_age {
            let cutoff = Utc::now() - max_age;
            index.entries.retain(|key, entry| {
                let fresh = key == keep || entry.saved_at >= cutoff;
                if !fresh {
                    debug!("Evicting cache entry {} (saved {})", key, entry.saved_at);
                }
                fresh
            });
        }

        let referenced: HashSet<&str> = index.entries.values().map(|e| e.file.as_str()).collect();
        let mut dir = tokio::fs::read_dir(self.blobs_dir()).await?;
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().into_owned();
            if name.ends_with(".blob") && !referenced.contains(name.as_str()) {
                match tokio::fs::remove_file(item.path()).await {
                    Ok(()) => debug!("Removed unreferenced cache blob {}", name),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn restore(&self, keys: &[String]) -> Result<Option<CacheHit>, CacheError> {
        let index = self.read_index().await?;
        let selected = select_key(
            keys,
            index.entries.iter().map(|(k, e)| (k.as_str(), e.saved_at)),
        );

        let Some(key) = selected else {
            return Ok(None);
        };
        let Some(entry) = index.entries.get(&key) else {
            return Ok(None);
        };

        match tokio::fs::read(self.blobs_dir().join(&entry.file)).await {
            Ok(blob) => Ok(Some(CacheHit {
                exact: is_exact(keys, &key),
                key,
                blob,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Cache index lists {} but its blob is missing", key);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, blob: Vec<u8>) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;

        let blobs = self.blobs_dir();
        tokio::fs::create_dir_all(&blobs).await?;

        let file = Self::blob_name(key);
        let tmp = blobs.join(format!("{}.tmp", file));
        let size = blob.len() as u64;
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, blobs.join(&file)).await?;

        let mut index = self.read_index().await?;
        index.entries.insert(
            key.to_string(),
            IndexEntry {
                file,
                size,
                saved_at: Utc::now(),
            },
        );
        self.prune(&mut index, key).await?;

        let index_tmp = self.root.join("index.json.tmp");
        tokio::fs::write(&index_tmp, serde_json::to_vec_pretty(&index)?).await?;
        tokio::fs::rename(&index_tmp, self.index_path()).await?;

        debug!("Saved cache entry {} ({} bytes)", key, size);
        Ok(())
    }
}
