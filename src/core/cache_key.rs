//! Composite cache keys: platform + prefix + content hash of manifest files

use crate::core::step::{render_template, CacheSpec};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Primary key plus ordered restore candidates, most specific first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub primary: String,
    pub restore_keys: Vec<String>,
}

impl CacheKey {
    /// Build the key for `spec`, hashing the manifest files found under `workspace`
    pub fn resolve(
        spec: &CacheSpec,
        workspace: &Path,
        platform: &str,
        variables: &HashMap<String, String>,
    ) -> io::Result<Self> {
        let prefix = render_template(&spec.prefix, variables);
        let base = format!("{}-{}-", platform, prefix);

        let files = collect_files(workspace, &spec.hash_files)?;
        let primary = if files.is_empty() {
            base.clone()
        } else {
            format!("{}{}", base, hash_files(workspace, &files)?)
        };

        let mut restore_keys: Vec<String> = spec
            .restore_keys
            .iter()
            .map(|k| render_template(k, variables))
            .collect();
        restore_keys.push(base);
        restore_keys.retain(|k| k != &primary);
        restore_keys.dedup();

        Ok(Self { primary, restore_keys })
    }

    /// Every candidate in lookup order
    pub fn candidates(&self) -> Vec<String> {
        let mut keys = vec![self.primary.clone()];
        keys.extend(self.restore_keys.iter().cloned());
        keys
    }
}

/// Expand glob patterns relative to `root`, returning sorted relative paths of regular files
pub fn collect_files(root: &Path, patterns: &[String]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let full = root.join(pattern);
        let full = full.to_string_lossy();
        let paths = glob::glob(&full)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{}: {}", pattern, e)))?;
        for entry in paths {
            let path = entry.map_err(|e| e.into_error())?;
            if path.is_file() {
                if let Ok(relative) = path.strip_prefix(root) {
                    files.push(relative.to_path_buf());
                }
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// SHA-256 over every file's relative path and contents
fn hash_files(root: &Path, files: &[PathBuf]) -> io::Result<String> {
    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(file.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(std::fs::read(root.join(file))?);
    }
    Ok(hex::encode(hasher.finalize()))
}
