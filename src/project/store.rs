//! Project-file fallback store
//!
//! Persists per-run project state records as a single JSON array at a
//! configured path, rewritten atomically via temp file + rename. This is
//! the fallback when no relational backend is wired in.

use crate::error::GatewayResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata of one synced artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Repo-relative artifact path
    pub path: String,
    /// Payload size in bytes
    pub size_bytes: u64,
}

/// One project state record, keyed by (project, run)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Owning project
    pub project_id: String,
    /// The run the record describes
    pub run_id: String,
    /// Worker that produced the run
    pub worker_id: String,
    /// Artifacts synced after the run
    pub artifacts: Vec<ArtifactMeta>,
    /// Last update, unix milliseconds
    pub updated_at_unix_ms: i64,
}

/// JSON-array-on-disk project store.
pub struct ProjectFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ProjectFileStore {
    /// Create a store writing to `path`; parent directories are created
    pub fn new(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// All records; a missing file reads as empty
    pub fn load(&self) -> GatewayResult<Vec<ProjectRecord>> {
        let _guard = self.lock.lock();
        self.load_unlocked()
    }

    /// Insert or replace the record for `(project_id, run_id)`
    pub fn upsert(&self, record: ProjectRecord) -> GatewayResult<()> {
        let _guard = self.lock.lock();
        let mut records = self.load_unlocked()?;
        records.retain(|r| !(r.project_id == record.project_id && r.run_id == record.run_id));
        records.push(record);
        self.persist_unlocked(&records)
    }

    /// Records for one project, newest first
    pub fn for_project(&self, project_id: &str) -> GatewayResult<Vec<ProjectRecord>> {
        let mut records = self.load()?;
        records.retain(|r| r.project_id == project_id);
        records.sort_by(|a, b| b.updated_at_unix_ms.cmp(&a.updated_at_unix_ms));
        Ok(records)
    }

    fn load_unlocked(&self) -> GatewayResult<Vec<ProjectRecord>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_default()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn persist_unlocked(&self, records: &[ProjectRecord]) -> GatewayResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(project: &str, run: &str) -> ProjectRecord {
        ProjectRecord {
            project_id: project.to_string(),
            run_id: run.to_string(),
            worker_id: "w".to_string(),
            artifacts: vec![ArtifactMeta {
                path: "out.txt".to_string(),
                size_bytes: 3,
            }],
            updated_at_unix_ms: 1,
        }
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = ProjectFileStore::new(dir.path().join("projects.json")).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn upsert_replaces_by_project_and_run() {
        let dir = TempDir::new().unwrap();
        let store = ProjectFileStore::new(dir.path().join("projects.json")).unwrap();
        store.upsert(record("p1", "run-1")).unwrap();
        let mut updated = record("p1", "run-1");
        updated.artifacts.push(ArtifactMeta {
            path: "second.txt".to_string(),
            size_bytes: 7,
        });
        store.upsert(updated.clone()).unwrap();

        let records = store.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], updated);
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("projects.json");
        {
            let store = ProjectFileStore::new(&path).unwrap();
            store.upsert(record("p1", "run-1")).unwrap();
        }
        let store = ProjectFileStore::new(&path).unwrap();
        assert_eq!(store.for_project("p1").unwrap().len(), 1);
    }
}
