//! Disk LRU+TTL store scenarios: restart durability and index recovery.

use loom_gateway::DiskCache;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn restart_preserves_unexpired_entries() {
    // Open at root R, set, close, open at R again: the value survives.
    let root = TempDir::new().unwrap();
    {
        let store = DiskCache::open(root.path(), Duration::from_secs(60), 10, 0).unwrap();
        store.set("persist", b"value").unwrap();
    }
    let store = DiskCache::open(root.path(), Duration::from_secs(60), 10, 0).unwrap();
    assert_eq!(store.get("persist").unwrap(), Some(b"value".to_vec()));
}

#[test]
fn restart_drops_expired_entries() {
    let root = TempDir::new().unwrap();
    {
        let store = DiskCache::open(root.path(), Duration::from_millis(20), 10, 0).unwrap();
        store.set("ephemeral", b"value").unwrap();
    }
    std::thread::sleep(Duration::from_millis(50));
    let store = DiskCache::open(root.path(), Duration::from_millis(20), 10, 0).unwrap();
    assert_eq!(store.get("ephemeral").unwrap(), None);
    assert!(store.is_empty());
}

#[test]
fn missing_backing_file_is_a_miss() {
    let root = TempDir::new().unwrap();
    let store = DiskCache::open(root.path(), Duration::from_secs(60), 10, 0).unwrap();
    store.set("k", b"v").unwrap();

    // Remove the single data file behind the store's back.
    let data_dir = root.path().join("data");
    for entry in std::fs::read_dir(&data_dir).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }

    assert_eq!(store.get("k").unwrap(), None);
    // The stale index entry was dropped along with the miss.
    assert!(store.is_empty());
}

#[test]
fn reopen_reconciles_orphaned_index_entries() {
    let root = TempDir::new().unwrap();
    {
        let store = DiskCache::open(root.path(), Duration::from_secs(60), 10, 0).unwrap();
        store.set("a", b"aa").unwrap();
        store.set("b", b"bb").unwrap();
    }
    // Delete one backing file between opens.
    let data_dir = root.path().join("data");
    let victim = std::fs::read_dir(&data_dir)
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    std::fs::remove_file(victim).unwrap();

    let store = DiskCache::open(root.path(), Duration::from_secs(60), 10, 0).unwrap();
    assert_eq!(store.len(), 1);
}

#[test]
fn index_file_is_valid_json_after_mutations() {
    let root = TempDir::new().unwrap();
    let store = DiskCache::open(root.path(), Duration::from_secs(60), 10, 0).unwrap();
    store.set("a", b"aa").unwrap();
    store.set("b", b"bb").unwrap();
    store.delete("a").unwrap();

    let index = std::fs::read(root.path().join("index.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&index).unwrap();
    assert!(parsed["entries"].get("b").is_some());
    assert!(parsed["entries"].get("a").is_none());
}

#[test]
fn eviction_respects_entry_bound_across_restarts() {
    let root = TempDir::new().unwrap();
    {
        let store = DiskCache::open(root.path(), Duration::from_secs(60), 10, 0).unwrap();
        for i in 0..6 {
            store.set(&format!("k{}", i), b"x").unwrap();
        }
    }
    // Reopen with a tighter bound: the open-time eviction pass applies it.
    let store = DiskCache::open(root.path(), Duration::from_secs(60), 3, 0).unwrap();
    assert!(store.len() <= 3);
}
