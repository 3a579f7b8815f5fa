//! Disk-backed LRU+TTL store
//!
//! Same contract as the in-memory cache with values on the filesystem.
//! Layout under a configurable root:
//!
//! ```text
//! <root>/data/<sha256(key)>.bin   value payloads
//! <root>/<index_file>             JSON index, written via temp file + rename
//! ```
//!
//! The index rename is atomic on a POSIX filesystem, so a crash after any
//! successful mutation leaves either the previous consistent index or the
//! new one. Orphan data files are tolerated on the next open.

use crate::error::{GatewayError, GatewayResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_INDEX_FILE: &str = "index.json";
const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// One persisted index record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    /// Backing file name under `data/`, content-addressed by the key hash
    file: String,
    /// Payload size in bytes
    size: u64,
    /// Absolute expiry, unix milliseconds
    expires_at_ms: i64,
    /// Last access, unix milliseconds
    accessed_at_ms: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    entries: HashMap<String, IndexEntry>,
}

struct Inner {
    index: Index,
    total_bytes: u64,
}

/// Disk LRU+TTL store for string-keyed byte payloads.
pub struct DiskCache {
    root: PathBuf,
    data_dir: PathBuf,
    index_path: PathBuf,
    ttl: Duration,
    max_entries: usize,
    max_bytes: u64,
    inner: Mutex<Inner>,
}

impl DiskCache {
    /// Open (or create) a store at `root` with the default index file name.
    pub fn open(root: impl AsRef<Path>, ttl: Duration, max_entries: i64, max_bytes: i64) -> GatewayResult<Self> {
        Self::open_with_index(root, DEFAULT_INDEX_FILE, ttl, max_entries, max_bytes)
    }

    /// Open (or create) a store with an explicit index file name.
    ///
    /// Open protocol: create the data directory, load the index (missing is
    /// treated as empty), drop entries whose TTL has passed or whose backing
    /// file is gone, evict to bounds, then persist the reconciled index.
    pub fn open_with_index(
        root: impl AsRef<Path>,
        index_file: &str,
        ttl: Duration,
        max_entries: i64,
        max_bytes: i64,
    ) -> GatewayResult<Self> {
        let root = root.as_ref().to_path_buf();
        let data_dir = root.join("data");
        fs::create_dir_all(&data_dir)?;

        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };
        let store = Self {
            index_path: root.join(index_file),
            data_dir,
            root,
            ttl,
            max_entries: max_entries.max(1) as usize,
            max_bytes: max_bytes.max(0) as u64,
            inner: Mutex::new(Inner {
                index: Index::default(),
                total_bytes: 0,
            }),
        };

        {
            let mut inner = store.inner.lock();
            inner.index = store.load_index()?;
            store.reconcile_locked(&mut inner);
            store.evict_locked(&mut inner);
            store.persist_locked(&inner)?;
        }
        Ok(store)
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up a key. A hit touches the access time and persists the index;
    /// an expired or orphaned entry is dropped and reported as a miss.
    pub fn get(&self, key: &str) -> GatewayResult<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let now = now_ms();

        let entry = match inner.index.entries.get(key) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };

        if entry.expires_at_ms <= now {
            self.remove_entry_locked(&mut inner, key);
            self.persist_locked(&inner)?;
            return Ok(None);
        }

        let path = self.data_dir.join(&entry.file);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                // Stale index entry: the backing file vanished underneath us.
                debug!(key, "disk cache backing file missing, dropping entry");
                self.remove_entry_locked(&mut inner, key);
                self.persist_locked(&inner)?;
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(live) = inner.index.entries.get_mut(key) {
            live.accessed_at_ms = now;
        }
        self.persist_locked(&inner)?;
        Ok(Some(bytes))
    }

    /// Insert or replace an entry. The value file is written before the
    /// index is updated, so a crash in between leaves only an orphan file.
    pub fn set(&self, key: &str, value: &[u8]) -> GatewayResult<()> {
        let mut inner = self.inner.lock();
        let now = now_ms();
        let file = format!("{}.bin", hash_key(key));

        fs::write(self.data_dir.join(&file), value)?;

        if let Some(old) = inner.index.entries.remove(key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.size);
        }
        inner.total_bytes += value.len() as u64;
        inner.index.entries.insert(
            key.to_string(),
            IndexEntry {
                file,
                size: value.len() as u64,
                expires_at_ms: now + self.ttl.as_millis() as i64,
                accessed_at_ms: now,
            },
        );

        self.evict_locked(&mut inner);
        self.persist_locked(&inner)?;
        Ok(())
    }

    /// Remove one entry. The backing file removal is best-effort.
    pub fn delete(&self, key: &str) -> GatewayResult<()> {
        let mut inner = self.inner.lock();
        self.remove_entry_locked(&mut inner, key);
        self.persist_locked(&inner)?;
        Ok(())
    }

    /// Remove every entry and its backing file.
    pub fn clear(&self) -> GatewayResult<()> {
        let mut inner = self.inner.lock();
        let files: Vec<String> = inner
            .index
            .entries
            .values()
            .map(|e| e.file.clone())
            .collect();
        for file in files {
            if let Err(err) = fs::remove_file(self.data_dir.join(&file)) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(file, error = %err, "failed to remove disk cache file");
                }
            }
        }
        inner.index.entries.clear();
        inner.total_bytes = 0;
        self.persist_locked(&inner)?;
        Ok(())
    }

    /// Current entry count
    pub fn len(&self) -> usize {
        self.inner.lock().index.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of payload sizes
    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().total_bytes
    }

    fn load_index(&self) -> GatewayResult<Index> {
        match fs::read(&self.index_path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(index) => Ok(index),
                Err(err) => {
                    warn!(error = %err, "disk cache index unreadable, starting empty");
                    Ok(Index::default())
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Index::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Drop entries whose TTL has passed or whose backing file is missing,
    /// and recompute the byte total.
    fn reconcile_locked(&self, inner: &mut Inner) {
        let now = now_ms();
        let stale: Vec<String> = inner
            .index
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at_ms <= now || !self.data_dir.join(&e.file).is_file())
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            self.remove_entry_locked(inner, &key);
        }
        inner.total_bytes = inner.index.entries.values().map(|e| e.size).sum();
    }

    /// Evict least-recently-accessed entries until both bounds hold.
    fn evict_locked(&self, inner: &mut Inner) {
        while inner.index.entries.len() > self.max_entries
            || (self.max_bytes > 0 && inner.total_bytes > self.max_bytes)
        {
            let oldest = inner
                .index
                .entries
                .iter()
                .min_by_key(|(_, e)| e.accessed_at_ms)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => self.remove_entry_locked(inner, &key),
                None => break,
            }
        }
    }

    fn remove_entry_locked(&self, inner: &mut Inner, key: &str) {
        if let Some(entry) = inner.index.entries.remove(key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(entry.size);
            if let Err(err) = fs::remove_file(self.data_dir.join(&entry.file)) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(key, error = %err, "failed to remove disk cache file");
                }
            }
        }
    }

    /// Persist the index via temp file + rename.
    fn persist_locked(&self, inner: &Inner) -> GatewayResult<()> {
        let tmp = self.index_path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&inner.index)
            .map_err(|e| GatewayError::StatePersistence(format!("index encode: {}", e)))?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.index_path)?;
        Ok(())
    }
}

fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
