//! Shared stores: keyed cache blobs and per-run artifacts

pub mod archive;
pub mod artifact;
pub mod cache;

pub use artifact::{Artifact, ArtifactError, ArtifactStore, ArtifactSummary, FsArtifactStore, InMemoryArtifactStore};
pub use cache::{CacheError, CacheHit, CacheStore, FsCacheStore, InMemoryCacheStore};
