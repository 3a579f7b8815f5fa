//! Artifact storage
//!
//! Artifacts are files produced by a run, addressed by `(run_id, path)` with
//! repo-relative, forward-slash-normalized paths. The [`ArtifactStore`] trait
//! is the pluggable origin contract; the cache facade in [`crate::cache`]
//! wraps any implementation.

mod fs;
mod memory;

pub use fs::FsArtifactStore;
pub use memory::InMemoryArtifactStore;

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;

/// Pluggable artifact origin store.
///
/// `get` returns [`GatewayError::NotFound`] for absent keys; `get_url`
/// returns an empty string when the backend does not support URLs. `list`
/// returns paths sorted lexicographically.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store one artifact
    async fn put(&self, run_id: &str, path: &str, content: &[u8]) -> GatewayResult<()>;

    /// Fetch one artifact
    async fn get(&self, run_id: &str, path: &str) -> GatewayResult<Vec<u8>>;

    /// List artifact paths for a run, sorted lexicographically
    async fn list(&self, run_id: &str) -> GatewayResult<Vec<String>>;

    /// Resolve a fetch URL for an artifact; empty when not supported
    async fn get_url(&self, run_id: &str, path: &str) -> GatewayResult<String>;
}

/// Validate a `(run_id, path)` pair and produce the logical cache key
/// `run_id + "/" + path` with leading slashes trimmed from the path.
///
/// Paths must be repo-relative: never absolute, never containing `..`.
pub fn artifact_key(run_id: &str, path: &str) -> GatewayResult<String> {
    let run_id = run_id.trim();
    if run_id.is_empty() {
        return Err(GatewayError::InvalidArgument(
            "run id must not be empty".to_string(),
        ));
    }
    let normalized = normalize_path(path)?;
    Ok(format!("{}/{}", run_id, normalized))
}

/// Normalize and validate a repo-relative artifact path.
pub fn normalize_path(path: &str) -> GatewayResult<String> {
    let path = path.trim().replace('\\', "/");
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(GatewayError::InvalidArgument(
            "artifact path must not be empty".to_string(),
        ));
    }
    if path.starts_with('/') {
        return Err(GatewayError::InvalidArgument(format!(
            "artifact path must be relative: {}",
            path
        )));
    }
    if trimmed.split('/').any(|seg| seg == "..") {
        return Err(GatewayError::InvalidArgument(format!(
            "artifact path must not traverse upward: {}",
            path
        )));
    }
    Ok(trimmed.to_string())
}
