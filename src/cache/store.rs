//! Read-through / write-through artifact cache facade
//!
//! Wraps any [`ArtifactStore`] origin with blob, listing, and URL caches.
//! Every byte slice crossing the facade boundary is duplicated: the facade
//! stores a copy and hands a copy out, so no caller can mutate a cached
//! buffer in place. On origin write failure the caches are left untouched;
//! the cache never contains data the origin rejected.

use crate::artifact::{artifact_key, ArtifactStore};
use crate::cache::memory::MemoryCache;
use crate::config::CacheConfig;
use crate::error::GatewayResult;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Hit/miss and origin counters for the artifact facade
#[derive(Default)]
pub struct StoreMetrics {
    blob_hits: AtomicU64,
    blob_misses: AtomicU64,
    origin_reads: AtomicU64,
    origin_read_errors: AtomicU64,
    origin_writes: AtomicU64,
    origin_write_errors: AtomicU64,
}

/// Point-in-time snapshot of [`StoreMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreMetricsSnapshot {
    pub blob_hits: u64,
    pub blob_misses: u64,
    pub origin_reads: u64,
    pub origin_read_errors: u64,
    pub origin_writes: u64,
    pub origin_write_errors: u64,
}

impl StoreMetrics {
    /// Snapshot all counters
    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            blob_hits: self.blob_hits.load(Ordering::Relaxed),
            blob_misses: self.blob_misses.load(Ordering::Relaxed),
            origin_reads: self.origin_reads.load(Ordering::Relaxed),
            origin_read_errors: self.origin_read_errors.load(Ordering::Relaxed),
            origin_writes: self.origin_writes.load(Ordering::Relaxed),
            origin_write_errors: self.origin_write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Caching facade over an artifact origin store.
pub struct CachedArtifactStore {
    origin: Arc<dyn ArtifactStore>,
    blobs: MemoryCache<String, Vec<u8>>,
    listings: MemoryCache<String, Vec<String>>,
    urls: MemoryCache<String, String>,
    metrics: StoreMetrics,
}

impl CachedArtifactStore {
    /// Wrap `origin` with caches tuned by `config` (normalized first).
    pub fn new(origin: Arc<dyn ArtifactStore>, config: &CacheConfig) -> Self {
        let config = config.normalized();
        Self {
            origin,
            blobs: MemoryCache::with_tuning(config.blob),
            listings: MemoryCache::with_tuning(config.list),
            urls: MemoryCache::with_tuning(config.url),
            metrics: StoreMetrics::default(),
        }
    }

    /// Counter snapshot
    pub fn metrics(&self) -> StoreMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drop every cached value; the origin is untouched.
    pub fn invalidate_all(&self) {
        self.blobs.clear();
        self.listings.clear();
        self.urls.clear();
    }
}

#[async_trait]
impl ArtifactStore for CachedArtifactStore {
    async fn put(&self, run_id: &str, path: &str, content: &[u8]) -> GatewayResult<()> {
        let key = artifact_key(run_id, path)?;
        self.metrics.origin_writes.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = self.origin.put(run_id, path, content).await {
            self.metrics
                .origin_write_errors
                .fetch_add(1, Ordering::Relaxed);
            warn!(run_id, path, error = %err, "artifact origin write failed");
            return Err(err);
        }

        self.blobs
            .set(key.clone(), content.to_vec(), content.len() as i64);
        // The listing for this run and any previously resolved URL for this
        // key may both be stale after a successful write.
        self.listings.delete(&run_id.trim().to_string());
        self.urls.delete(&key);
        Ok(())
    }

    async fn get(&self, run_id: &str, path: &str) -> GatewayResult<Vec<u8>> {
        let key = artifact_key(run_id, path)?;

        if let Some(bytes) = self.blobs.get(&key) {
            self.metrics.blob_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(bytes);
        }
        self.metrics.blob_misses.fetch_add(1, Ordering::Relaxed);
        self.metrics.origin_reads.fetch_add(1, Ordering::Relaxed);

        match self.origin.get(run_id, path).await {
            Ok(bytes) => {
                self.blobs.set(key, bytes.clone(), bytes.len() as i64);
                Ok(bytes)
            }
            Err(err) => {
                // Every origin error counts, the not-found path included.
                self.metrics
                    .origin_read_errors
                    .fetch_add(1, Ordering::Relaxed);
                if !err.is_not_found() {
                    warn!(run_id, path, error = %err, "artifact origin read failed");
                }
                Err(err)
            }
        }
    }

    async fn list(&self, run_id: &str) -> GatewayResult<Vec<String>> {
        let list_key = run_id.trim().to_string();
        if let Some(paths) = self.listings.get(&list_key) {
            return Ok(paths);
        }
        let paths = self.origin.list(run_id).await?;
        let weight: i64 = paths.iter().map(|p| p.len() as i64).sum();
        self.listings.set(list_key, paths.clone(), weight);
        Ok(paths)
    }

    async fn get_url(&self, run_id: &str, path: &str) -> GatewayResult<String> {
        let key = artifact_key(run_id, path)?;
        if let Some(url) = self.urls.get(&key) {
            return Ok(url);
        }
        let url = self.origin.get_url(run_id, path).await?;
        if !url.is_empty() {
            self.urls.set(key, url.clone(), url.len() as i64);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::InMemoryArtifactStore;
    use crate::error::GatewayError;
    use parking_lot::Mutex;

    fn facade(origin: Arc<dyn ArtifactStore>) -> CachedArtifactStore {
        CachedArtifactStore::new(origin, &CacheConfig::default())
    }

    #[tokio::test]
    async fn second_read_hits_cache() {
        let origin = Arc::new(InMemoryArtifactStore::new());
        origin.put("r1", "a.txt", b"hello").await.unwrap();
        let store = facade(origin);

        assert_eq!(store.get("r1", "a.txt").await.unwrap(), b"hello".to_vec());
        assert_eq!(store.get("r1", "a.txt").await.unwrap(), b"hello".to_vec());

        let m = store.metrics();
        assert_eq!(m.blob_hits, 1);
        assert_eq!(m.blob_misses, 1);
        assert_eq!(m.origin_reads, 1);
    }

    #[tokio::test]
    async fn not_found_read_counts_as_origin_read_error() {
        let store = facade(Arc::new(InMemoryArtifactStore::new()));

        assert!(store.get("r1", "missing.txt").await.unwrap_err().is_not_found());

        let m = store.metrics();
        assert_eq!(m.blob_misses, 1);
        assert_eq!(m.origin_reads, 1);
        assert_eq!(m.origin_read_errors, 1);
    }

    #[tokio::test]
    async fn returned_buffer_is_a_copy() {
        let origin = Arc::new(InMemoryArtifactStore::new());
        origin.put("r1", "a.txt", b"hello").await.unwrap();
        let store = facade(origin);

        let mut first = store.get("r1", "a.txt").await.unwrap();
        first[0] = b'X';
        assert_eq!(store.get("r1", "a.txt").await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn write_refreshes_blob_and_invalidates_listing() {
        let origin = Arc::new(InMemoryArtifactStore::new());
        let store = facade(origin);

        store.put("r1", "a.txt", b"one").await.unwrap();
        assert_eq!(store.list("r1").await.unwrap(), vec!["a.txt".to_string()]);
        store.put("r1", "b.txt", b"two").await.unwrap();
        // Listing cache was invalidated by the second write.
        assert_eq!(
            store.list("r1").await.unwrap(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
        // Blob reads are served from cache after write-through.
        assert_eq!(store.get("r1", "a.txt").await.unwrap(), b"one".to_vec());
        assert_eq!(store.metrics().blob_hits, 1);
    }

    struct FailingStore {
        fail_puts: Mutex<bool>,
        inner: InMemoryArtifactStore,
    }

    #[async_trait]
    impl ArtifactStore for FailingStore {
        async fn put(&self, run_id: &str, path: &str, content: &[u8]) -> GatewayResult<()> {
            if *self.fail_puts.lock() {
                return Err(GatewayError::Transient("origin down".to_string()));
            }
            self.inner.put(run_id, path, content).await
        }
        async fn get(&self, run_id: &str, path: &str) -> GatewayResult<Vec<u8>> {
            self.inner.get(run_id, path).await
        }
        async fn list(&self, run_id: &str) -> GatewayResult<Vec<String>> {
            self.inner.list(run_id).await
        }
        async fn get_url(&self, run_id: &str, path: &str) -> GatewayResult<String> {
            self.inner.get_url(run_id, path).await
        }
    }

    #[tokio::test]
    async fn failed_write_leaves_caches_untouched() {
        let origin = Arc::new(FailingStore {
            fail_puts: Mutex::new(true),
            inner: InMemoryArtifactStore::new(),
        });
        let store = facade(origin);

        assert!(store.put("r1", "a.txt", b"rejected").await.is_err());
        assert_eq!(store.metrics().origin_write_errors, 1);
        // The rejected bytes must not be observable through the cache.
        assert!(store.get("r1", "a.txt").await.unwrap_err().is_not_found());
    }
}
