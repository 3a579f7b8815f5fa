//! Filesystem artifact store
//!
//! Lays artifacts out as `<root>/<run_id>/<path>`. Run ids become a single
//! directory component; artifact paths keep their forward-slash structure.

use super::{normalize_path, ArtifactStore};
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// File-backed artifact store rooted at a configurable directory.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`, creating the directory if missing.
    pub fn new(root: impl AsRef<Path>) -> GatewayResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn run_dir(&self, run_id: &str) -> GatewayResult<PathBuf> {
        let run_id = run_id.trim();
        if run_id.is_empty() || run_id.contains('/') || run_id.contains("..") {
            return Err(GatewayError::InvalidArgument(format!(
                "invalid run id: {:?}",
                run_id
            )));
        }
        Ok(self.root.join(run_id))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, run_id: &str, path: &str, content: &[u8]) -> GatewayResult<()> {
        let rel = normalize_path(path)?;
        let full = self.run_dir(run_id)?.join(&rel);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(())
    }

    async fn get(&self, run_id: &str, path: &str) -> GatewayResult<Vec<u8>> {
        let rel = normalize_path(path)?;
        let full = self.run_dir(run_id)?.join(&rel);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(
                GatewayError::NotFound(format!("{}/{}", run_id.trim(), rel)),
            ),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, run_id: &str) -> GatewayResult<Vec<String>> {
        let dir = self.run_dir(run_id)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        let mut pending = vec![dir.clone()];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Ok(rel) = path.strip_prefix(&dir) {
                    paths.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn get_url(&self, _run_id: &str, _path: &str) -> GatewayResult<String> {
        // Local files have no fetchable URL.
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trip_and_nested_list() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();

        store.put("run-1", "out/report.txt", b"report").await.unwrap();
        store.put("run-1", "notes.md", b"notes").await.unwrap();

        assert_eq!(
            store.get("run-1", "out/report.txt").await.unwrap(),
            b"report".to_vec()
        );
        assert_eq!(
            store.list("run-1").await.unwrap(),
            vec!["notes.md".to_string(), "out/report.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        assert!(store.get("run-1", "missing.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn unknown_run_lists_empty() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        assert!(store.list("run-9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        assert!(store.put("run-1", "../escape.txt", b"x").await.is_err());
        assert!(store.put("bad/../run", "a.txt", b"x").await.is_err());
    }
}
