//! In-memory artifact store

use super::{normalize_path, ArtifactStore};
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Map-backed artifact store, primarily for tests and local development.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    runs: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl InMemoryArtifactStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, run_id: &str, path: &str, content: &[u8]) -> GatewayResult<()> {
        let path = normalize_path(path)?;
        let mut runs = self.runs.write();
        runs.entry(run_id.trim().to_string())
            .or_default()
            .insert(path, content.to_vec());
        Ok(())
    }

    async fn get(&self, run_id: &str, path: &str) -> GatewayResult<Vec<u8>> {
        let path = normalize_path(path)?;
        let runs = self.runs.read();
        runs.get(run_id.trim())
            .and_then(|files| files.get(&path))
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("{}/{}", run_id.trim(), path)))
    }

    async fn list(&self, run_id: &str) -> GatewayResult<Vec<String>> {
        let runs = self.runs.read();
        let mut paths: Vec<String> = runs
            .get(run_id.trim())
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        Ok(paths)
    }

    async fn get_url(&self, _run_id: &str, _path: &str) -> GatewayResult<String> {
        Ok(String::new())
    }
}
