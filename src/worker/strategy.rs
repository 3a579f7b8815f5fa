//! Worker strategy cache
//!
//! Persists worker outputs keyed by a SHA-256 fingerprint of the worker id
//! and its full input, so re-running a worker with identical inputs returns
//! the stored output without another provider round trip. Backed by the
//! disk LRU+TTL store, which bounds both entry count and on-disk footprint.

use super::WorkerInput;
use crate::cache::DiskCache;
use crate::error::GatewayResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// One cached worker result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    /// Structured worker output
    pub output: serde_json::Value,
    /// Client-facing view of the output
    pub client_view: serde_json::Value,
}

/// Disk-backed fingerprint cache for worker outputs.
pub struct StrategyCache {
    store: DiskCache,
}

impl StrategyCache {
    /// Default retention for cached outputs
    const TTL: Duration = Duration::from_secs(24 * 60 * 60);
    const MAX_ENTRIES: i64 = 4096;
    const MAX_BYTES: i64 = 256 * 1024 * 1024;

    /// Open the cache under `root`
    pub fn open(root: impl AsRef<Path>) -> GatewayResult<Self> {
        Ok(Self {
            store: DiskCache::open(root, Self::TTL, Self::MAX_ENTRIES, Self::MAX_BYTES)?,
        })
    }

    /// Fingerprint a worker invocation
    pub fn fingerprint(worker_id: &str, input: &WorkerInput) -> String {
        let mut hasher = Sha256::new();
        hasher.update(worker_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(input).unwrap_or_default());
        hex::encode(hasher.finalize())
    }

    /// Load a cached result; decode failures count as a miss
    pub fn load(&self, fingerprint: &str) -> GatewayResult<Option<StrategyRecord>> {
        match self.store.get(fingerprint)? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(record) => {
                    debug!(fingerprint, "strategy cache hit");
                    Ok(Some(record))
                }
                Err(_) => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Persist one result
    pub fn store(&self, fingerprint: &str, record: &StrategyRecord) -> GatewayResult<()> {
        let bytes = serde_json::to_vec(record)?;
        self.store.set(fingerprint, &bytes)
    }

    /// Track the most recent result of a worker, for dependency injection
    /// into downstream workers.
    pub fn store_latest(&self, worker_id: &str, record: &StrategyRecord) -> GatewayResult<()> {
        let bytes = serde_json::to_vec(record)?;
        self.store.set(&format!("latest/{}", worker_id), &bytes)
    }

    /// Most recent result of a worker, when one is cached
    pub fn load_latest(&self, worker_id: &str) -> GatewayResult<Option<StrategyRecord>> {
        match self.store.get(&format!("latest/{}", worker_id))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            None => Ok(None),
        }
    }
}
