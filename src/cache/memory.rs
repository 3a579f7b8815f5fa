//! In-memory LRU+TTL cache
//!
//! Generic capacity-bounded cache: maximum entry count, optional maximum
//! total bytes, per-entry TTL. Recency ordering comes from `lru::LruCache`;
//! TTL and byte accounting are layered on top. A single mutex guards the
//! structure, so all operations are O(1) amortized.

use crate::config::CacheTuning;
use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::time::{Duration, Instant};

const DEFAULT_TTL: Duration = Duration::from_secs(30);

struct Entry<V> {
    value: V,
    size: u64,
    expires_at: Instant,
    accessed_at: Instant,
}

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, Entry<V>>,
    total_bytes: u64,
}

/// Capacity-bounded in-memory cache with per-entry TTL.
///
/// Values are handed out as clones; the cache never shares a live reference
/// with its callers.
pub struct MemoryCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
    max_entries: usize,
    max_bytes: u64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MemoryCacheStats {
    /// Current entry count
    pub entries: usize,
    /// Sum of entry size hints
    pub total_bytes: u64,
}

impl<K: Hash + Eq, V: Clone> MemoryCache<K, V> {
    /// Create a cache with explicit bounds. A TTL of zero coerces to 30
    /// seconds, `max_entries <= 0` coerces to 1, and `max_bytes <= 0`
    /// disables the byte bound.
    pub fn new(ttl: Duration, max_entries: i64, max_bytes: i64) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
            ttl,
            max_entries: max_entries.max(1) as usize,
            max_bytes: max_bytes.max(0) as u64,
        }
    }

    /// Create a cache from a [`CacheTuning`] block
    pub fn with_tuning(tuning: CacheTuning) -> Self {
        Self::new(tuning.ttl(), tuning.max_entries, tuning.max_bytes)
    }

    /// Look up a key. Expired entries are removed on encounter and reported
    /// as a miss; a hit promotes the entry to most-recently-used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if let Some(entry) = inner.entries.peek(key) {
            if entry.expires_at <= now {
                if let Some(stale) = inner.entries.pop(key) {
                    inner.total_bytes = inner.total_bytes.saturating_sub(stale.size);
                }
                return None;
            }
        }

        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.accessed_at = now;
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    /// Insert or replace an entry and reset its expiry to now + TTL.
    /// Negative size hints coerce to 0. After the insert, entries are
    /// evicted from the least-recently-used end until both bounds hold.
    pub fn set(&self, key: K, value: V, size_bytes: i64) {
        let size = size_bytes.max(0) as u64;
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if let Some(old) = inner.entries.pop(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.size);
        }
        inner.entries.put(
            key,
            Entry {
                value,
                size,
                expires_at: now + self.ttl,
                accessed_at: now,
            },
        );
        inner.total_bytes += size;

        while inner.entries.len() > self.max_entries
            || (self.max_bytes > 0 && inner.total_bytes > self.max_bytes)
        {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(evicted.size);
                }
                None => break,
            }
        }
    }

    /// Remove one entry
    pub fn delete(&self, key: &K) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.pop(key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(entry.size);
        }
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_bytes = 0;
    }

    /// Current entry count
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of entry size hints
    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().total_bytes
    }

    /// When the entry was last read or written, without promoting it
    pub fn accessed_at(&self, key: &K) -> Option<Instant> {
        self.inner.lock().entries.peek(key).map(|e| e.accessed_at)
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> MemoryCacheStats {
        let inner = self.inner.lock();
        MemoryCacheStats {
            entries: inner.entries.len(),
            total_bytes: inner.total_bytes,
        }
    }
}
