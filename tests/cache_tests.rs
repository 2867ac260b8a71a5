use pitchdata::{BlobStore, CacheConfig, EvictionCache, FileBlobStore, MemoryBlobStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payload {
    x: i64,
}

#[test]
fn test_ttl_boundaries() {
    let cache: EvictionCache<String, Payload> =
        EvictionCache::new(CacheConfig::default().max_entries(8)).unwrap();

    cache.set_with_ttl("a".to_string(), Payload { x: 1 }, Duration::from_millis(100));

    // Well inside the TTL.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(cache.get(&"a".to_string()), Some(Payload { x: 1 }));

    // Well past it.
    thread::sleep(Duration::from_millis(100));
    assert_eq!(cache.get(&"a".to_string()), None);
}

#[test]
fn test_lru_victim_is_least_recently_accessed() {
    let cache: EvictionCache<String, Payload> =
        EvictionCache::new(CacheConfig::default().max_entries(2)).unwrap();

    cache.set("a".to_string(), Payload { x: 1 });
    cache.set("b".to_string(), Payload { x: 2 });
    cache.get(&"a".to_string()); // refresh recency of "a"
    cache.set("c".to_string(), Payload { x: 3 });

    assert_eq!(cache.get(&"a".to_string()), Some(Payload { x: 1 }));
    assert_eq!(cache.get(&"b".to_string()), None);
    assert_eq!(cache.get(&"c".to_string()), Some(Payload { x: 3 }));
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_size_never_exceeds_max_entries() {
    let cache: EvictionCache<String, Payload> =
        EvictionCache::new(CacheConfig::default().max_entries(4)).unwrap();

    for i in 0..50 {
        cache.set(format!("key-{i}"), Payload { x: i });
        assert!(cache.len() <= 4);
    }
    assert_eq!(cache.stats().evictions, 46);
}

#[test]
fn test_compressed_values_round_trip_exactly() {
    let cache: EvictionCache<String, Vec<String>> =
        EvictionCache::new(CacheConfig::default().max_entries(4).compress(true)).unwrap();

    let value: Vec<String> = (0..200).map(|i| format!("marker-{i}")).collect();
    cache.set("squad".to_string(), value.clone());

    assert!(cache.stats().compressed_fraction > 0.0);
    assert_eq!(cache.get(&"squad".to_string()), Some(value));
}

#[test]
fn test_persistence_survives_reconstruction_on_disk() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn BlobStore> = Arc::new(FileBlobStore::new(dir.path()).unwrap());
    let config = CacheConfig::default().max_entries(8).persist(true);

    {
        let cache: EvictionCache<String, Payload> =
            EvictionCache::with_store(config.clone(), Arc::clone(&store), "derived").unwrap();
        cache.set("a".to_string(), Payload { x: 7 });
    }

    let revived: EvictionCache<String, Payload> =
        EvictionCache::with_store(config, store, "derived").unwrap();
    assert_eq!(revived.get(&"a".to_string()), Some(Payload { x: 7 }));
}

#[test]
fn test_hydration_skips_already_expired_records() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let config = CacheConfig::default().max_entries(8).persist(true);

    {
        let cache: EvictionCache<String, Payload> =
            EvictionCache::with_store(config.clone(), Arc::clone(&store), "derived").unwrap();
        cache.set_with_ttl("short".to_string(), Payload { x: 1 }, Duration::from_millis(30));
        cache.set_with_ttl("long".to_string(), Payload { x: 2 }, Duration::from_secs(300));
    }

    thread::sleep(Duration::from_millis(60));
    let revived: EvictionCache<String, Payload> =
        EvictionCache::with_store(config, store, "derived").unwrap();

    assert_eq!(revived.get(&"short".to_string()), None);
    assert_eq!(revived.get(&"long".to_string()), Some(Payload { x: 2 }));
}

#[test]
fn test_corrupt_blob_leaves_cache_usable() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    store.write("derived", &[0xde, 0xad, 0xbe, 0xef]).unwrap();

    let cache: EvictionCache<String, Payload> = EvictionCache::with_store(
        CacheConfig::default().max_entries(8).persist(true),
        store,
        "derived",
    )
    .unwrap();

    assert!(cache.is_empty());
    cache.set("a".to_string(), Payload { x: 1 });
    assert_eq!(cache.get(&"a".to_string()), Some(Payload { x: 1 }));
}

#[test]
fn test_tampered_blob_is_discarded_not_fatal() {
    let store = Arc::new(MemoryBlobStore::new());
    let config = CacheConfig::default().max_entries(8).persist(true);

    {
        let cache: EvictionCache<String, Payload> = EvictionCache::with_store(
            config.clone(),
            Arc::clone(&store) as Arc<dyn BlobStore>,
            "derived",
        )
        .unwrap();
        cache.set("a".to_string(), Payload { x: 7 });
    }

    // Flip every byte of the persisted blob.
    let mut bytes = store.read("derived").unwrap().unwrap();
    for byte in &mut bytes {
        *byte ^= 0xff;
    }
    store.write("derived", &bytes).unwrap();

    let revived: EvictionCache<String, Payload> =
        EvictionCache::with_store(config, store as Arc<dyn BlobStore>, "derived").unwrap();
    assert!(revived.is_empty());
}

#[test]
fn test_eviction_and_expiry_look_like_absence() {
    let cache: EvictionCache<String, Payload> =
        EvictionCache::new(CacheConfig::default().max_entries(1)).unwrap();

    cache.set("evicted".to_string(), Payload { x: 1 });
    cache.set("present".to_string(), Payload { x: 2 });

    // Evicted, expired, and never-cached keys are indistinguishable.
    assert_eq!(cache.get(&"evicted".to_string()), None);
    assert_eq!(cache.get(&"never".to_string()), None);
    assert!(!cache.has(&"evicted".to_string()));
}

#[test]
fn test_stats_shape() {
    let cache: EvictionCache<String, Payload> =
        EvictionCache::new(CacheConfig::default().max_entries(8)).unwrap();

    cache.set("a".to_string(), Payload { x: 1 });
    cache.get(&"a".to_string());
    cache.get(&"missing".to_string());

    let stats = cache.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.max_size, 8);
    assert!(stats.total_bytes > 0);
    assert_eq!(stats.total_hits, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
}
