//! TTL + LRU eviction cache with optional compression and persistence.

use crate::cache::blob::BlobStore;
use crate::cache::codec::{Codec, GzipCodec};
use crate::cache::config::CacheConfig;
use crate::cache::stats::{CacheCounters, CacheStats};
use crate::core::{Result, StoreError};
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Values whose serialized form is larger than this go through the codec.
const COMPRESSION_THRESHOLD: usize = 1024;

/// Upper bound on records written per persisted snapshot.
const SNAPSHOT_MAX_RECORDS: usize = 128;

/// Layout version of the persisted blob.
const BLOB_VERSION: u32 = 1;

/// How a value is held in memory.
enum Payload<V> {
    Plain(V),
    Compressed(Vec<u8>),
}

/// A single cached value with its bookkeeping.
struct CacheEntry<V> {
    payload: Payload<V>,
    stored_at: SystemTime,
    ttl: Duration,
    hit_count: u64,
    size_bytes: usize,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: SystemTime) -> bool {
        match now.duration_since(self.stored_at) {
            Ok(age) => age > self.ttl,
            // Clock went backwards; treat the entry as fresh.
            Err(_) => false,
        }
    }

    fn is_compressed(&self) -> bool {
        matches!(self.payload, Payload::Compressed(_))
    }
}

struct CacheTable<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    total_bytes: usize,
}

impl<K: Hash + Eq, V> CacheTable<K, V> {
    fn drop_entry(&mut self, key: &K) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
                true
            }
            None => false,
        }
    }
}

/// One persisted cache record. The checksum covers the stored payload
/// bytes exactly as written.
#[derive(Serialize, Deserialize)]
struct BlobRecord<K> {
    key: K,
    payload: Vec<u8>,
    stored_at_ms: u64,
    ttl_ms: u64,
    size_bytes: u64,
    is_compressed: bool,
    checksum: u32,
}

#[derive(Serialize, Deserialize)]
struct CacheBlob<K> {
    version: u32,
    records: Vec<BlobRecord<K>>,
}

/// Generic key-value cache with TTL expiry and LRU eviction.
///
/// Entries past their TTL are logically absent the moment they expire and
/// are physically purged either lazily on access or by [`sweep`]. Large
/// values can be routed through a [`Codec`], and the whole table can be
/// persisted best-effort to a [`BlobStore`]; neither affects the caller's
/// view of the cache. Absence, expiry, and eviction are indistinguishable
/// on purpose.
///
/// All methods take `&self`; share the cache via [`Arc`] when the sweeper
/// or several owners need it.
///
/// [`sweep`]: EvictionCache::sweep
pub struct EvictionCache<K: Hash + Eq, V> {
    table: Mutex<CacheTable<K, V>>,
    config: CacheConfig,
    codec: Arc<dyn Codec>,
    counters: CacheCounters,
    store: Option<Arc<dyn BlobStore>>,
    namespace: String,
}

impl<K, V> EvictionCache<K, V>
where
    K: Hash + Eq + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Create an in-memory cache without persistence.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.max_entries)
            .ok_or_else(|| StoreError::InvalidConfig("max_entries must be > 0".to_string()))?;
        Ok(Self {
            table: Mutex::new(CacheTable {
                entries: LruCache::new(capacity),
                total_bytes: 0,
            }),
            config,
            codec: Arc::new(GzipCodec::new()),
            counters: CacheCounters::default(),
            store: None,
            namespace: String::new(),
        })
    }

    /// Create a cache backed by a blob store and hydrate whatever usable
    /// state the store still holds under `namespace`. Records that are
    /// already expired, fail their checksum, or fail to decode are silently
    /// discarded; an unreadable blob leaves the cache empty.
    pub fn with_store(
        config: CacheConfig,
        store: Arc<dyn BlobStore>,
        namespace: impl Into<String>,
    ) -> Result<Self> {
        let mut cache = Self::new(config)?;
        cache.store = Some(store);
        cache.namespace = namespace.into();
        cache.hydrate();
        Ok(cache)
    }

    /// Replace the codec selected at construction.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    fn lock(&self) -> MutexGuard<'_, CacheTable<K, V>> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove the entry if it is past its TTL. Returns true when an
    /// expired entry was purged.
    fn purge_expired(&self, table: &mut CacheTable<K, V>, key: &K, now: SystemTime) -> bool {
        let expired = table
            .entries
            .peek(key)
            .is_some_and(|entry| entry.is_expired(now));
        if expired {
            table.drop_entry(key);
            self.counters.record_expiration();
        }
        expired
    }

    /// Look up a value. Expired entries are purged and reported absent; a
    /// hit refreshes recency and transparently decompresses.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut table = self.lock();
        let now = SystemTime::now();

        if self.purge_expired(&mut table, key, now) {
            self.counters.record_miss();
            return None;
        }

        let decoded: Result<V> = {
            let entry = match table.entries.get_mut(key) {
                Some(entry) => entry,
                None => {
                    self.counters.record_miss();
                    return None;
                }
            };
            entry.hit_count += 1;
            match &entry.payload {
                Payload::Plain(value) => Ok(value.clone()),
                Payload::Compressed(bytes) => self.codec.decode(bytes).and_then(|raw| {
                    rmp_serde::from_slice::<V>(&raw)
                        .map_err(|e| StoreError::Integrity(e.to_string()))
                }),
            }
        };

        match decoded {
            Ok(value) => {
                self.counters.record_hit();
                Some(value)
            }
            Err(err) => {
                log::warn!("Discarding cache entry that failed integrity check: {err}");
                table.drop_entry(key);
                self.counters.record_miss();
                None
            }
        }
    }

    /// Store a value under the default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.config.default_ttl);
    }

    /// Store a value with an explicit TTL. Inserting at capacity evicts
    /// the least-recently-used entry. Persistence is best-effort: a failed
    /// snapshot is logged and the call still succeeds.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let serialized = match rmp_serde::to_vec(&value) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                log::debug!("Cache value not serializable, approximate size unknown: {err}");
                None
            }
        };
        let size_bytes = serialized.as_ref().map_or(0, Vec::len);

        let mut encoded = None;
        if self.config.compress && size_bytes > COMPRESSION_THRESHOLD {
            if let Some(bytes) = serialized.as_deref() {
                match self.codec.encode(bytes) {
                    Ok(out) if out.len() < size_bytes => encoded = Some(out),
                    // Encoded form is no smaller; keep the plain value.
                    Ok(_) => {}
                    Err(err) => log::warn!("Compression failed, storing uncompressed: {err}"),
                }
            }
        }
        let payload = match encoded {
            Some(bytes) => Payload::Compressed(bytes),
            None => Payload::Plain(value),
        };
        let entry = CacheEntry {
            payload,
            stored_at: SystemTime::now(),
            ttl,
            hit_count: 0,
            size_bytes,
        };

        let mut table = self.lock();
        table.drop_entry(&key);
        if let Some((_, evicted)) = table.entries.push(key, entry) {
            table.total_bytes = table.total_bytes.saturating_sub(evicted.size_bytes);
            self.counters.record_eviction();
        }
        table.total_bytes += size_bytes;

        if self.config.persist {
            if let Err(err) = self.persist_locked(&table) {
                log::warn!(
                    "Cache persistence failed for namespace '{}': {err}",
                    self.namespace
                );
            }
        }
    }

    /// Containment check with the same expiry semantics as [`get`], but
    /// without touching recency or hit counters.
    ///
    /// [`get`]: EvictionCache::get
    pub fn has(&self, key: &K) -> bool {
        let mut table = self.lock();
        if self.purge_expired(&mut table, key, SystemTime::now()) {
            return false;
        }
        table.entries.peek(key).is_some()
    }

    /// Remove a single entry. Returns whether it was present.
    pub fn delete(&self, key: &K) -> bool {
        let mut table = self.lock();
        table.drop_entry(key)
    }

    /// Remove every entry whose key matches the predicate. Returns the
    /// number of entries removed.
    pub fn delete_if<F>(&self, pred: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let mut table = self.lock();
        let matching: Vec<K> = table
            .entries
            .iter()
            .filter(|(key, _)| pred(key))
            .map(|(key, _)| key.clone())
            .collect();
        let mut removed = 0;
        for key in &matching {
            if table.drop_entry(key) {
                removed += 1;
            }
        }
        removed
    }

    /// Drop every entry and, when persistence is enabled, the persisted
    /// blob as well.
    pub fn clear(&self) {
        let mut table = self.lock();
        table.entries.clear();
        table.total_bytes = 0;
        if self.config.persist {
            if let Some(store) = &self.store {
                if let Err(err) = store.delete(&self.namespace) {
                    log::warn!(
                        "Failed to delete persisted blob for namespace '{}': {err}",
                        self.namespace
                    );
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Snapshot of table state and lifetime counters.
    pub fn stats(&self) -> CacheStats {
        let table = self.lock();
        let size = table.entries.len();
        let compressed = table
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_compressed())
            .count();
        let total_hits = table.entries.iter().map(|(_, entry)| entry.hit_count).sum();
        CacheStats {
            size,
            max_size: self.config.max_entries,
            total_bytes: table.total_bytes,
            total_hits,
            hits: self.counters.hits(),
            misses: self.counters.misses(),
            evictions: self.counters.evictions(),
            expirations: self.counters.expirations(),
            compressed_fraction: if size == 0 {
                0.0
            } else {
                compressed as f64 / size as f64
            },
        }
    }

    /// Remove every TTL-expired entry. The LRU capacity bound is enforced
    /// continuously by the table itself, so expiry is all a sweep does.
    pub fn sweep(&self) -> usize {
        let mut table = self.lock();
        let now = SystemTime::now();
        let expired: Vec<K> = table
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            if table.drop_entry(key) {
                self.counters.record_expiration();
            }
        }
        expired.len()
    }

    /// Spawn the periodic expiry sweep on the current Tokio runtime. The
    /// returned handle aborts the task when stopped or dropped.
    pub fn spawn_sweeper(cache: &Arc<Self>) -> SweeperHandle
    where
        K: Send + 'static,
        V: Send + 'static,
    {
        let cache = Arc::clone(cache);
        let every = cache.config.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    log::debug!("Cache sweep removed {removed} expired entries");
                }
            }
        });
        SweeperHandle { handle }
    }

    /// Write a bounded snapshot of the table, most-recently-used first.
    fn persist_locked(&self, table: &CacheTable<K, V>) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let mut records = Vec::new();
        for (key, entry) in table.entries.iter().take(SNAPSHOT_MAX_RECORDS) {
            let (payload, is_compressed) = match &entry.payload {
                Payload::Compressed(bytes) => (bytes.clone(), true),
                Payload::Plain(value) => match rmp_serde::to_vec(value) {
                    Ok(bytes) => (bytes, false),
                    Err(_) => continue,
                },
            };
            let stored_at_ms = entry
                .stored_at
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_millis() as u64);
            records.push(BlobRecord {
                key: key.clone(),
                checksum: crc32fast::hash(&payload),
                payload,
                stored_at_ms,
                ttl_ms: entry.ttl.as_millis() as u64,
                size_bytes: entry.size_bytes as u64,
                is_compressed,
            });
        }
        let blob = CacheBlob {
            version: BLOB_VERSION,
            records,
        };
        let bytes =
            rmp_serde::to_vec(&blob).map_err(|e| StoreError::Serialization(e.to_string()))?;
        store.write(&self.namespace, &bytes)
    }

    /// Load persisted records, skipping anything expired or corrupt.
    fn hydrate(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let raw = match store.read(&self.namespace) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(err) => {
                log::warn!(
                    "Cache hydration failed for namespace '{}': {err}",
                    self.namespace
                );
                return;
            }
        };
        let blob: CacheBlob<K> = match rmp_serde::from_slice(&raw) {
            Ok(blob) => blob,
            Err(err) => {
                log::warn!(
                    "Discarding undecodable cache blob for namespace '{}': {err}",
                    self.namespace
                );
                return;
            }
        };
        if blob.version != BLOB_VERSION {
            log::warn!(
                "Discarding cache blob with layout version {} (expected {BLOB_VERSION})",
                blob.version
            );
            return;
        }

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        let mut table = self.lock();
        // Records were written most-recently-used first; insert in reverse
        // so the hydrated table ends up in the same recency order.
        for record in blob.records.into_iter().rev() {
            if crc32fast::hash(&record.payload) != record.checksum {
                log::debug!("Discarding persisted record with checksum mismatch");
                continue;
            }
            if now_ms.saturating_sub(record.stored_at_ms) > record.ttl_ms {
                continue;
            }
            let payload = if record.is_compressed {
                Payload::Compressed(record.payload)
            } else {
                match rmp_serde::from_slice::<V>(&record.payload) {
                    Ok(value) => Payload::Plain(value),
                    Err(err) => {
                        log::debug!("Discarding undecodable persisted record: {err}");
                        continue;
                    }
                }
            };
            let size_bytes = record.size_bytes as usize;
            let entry = CacheEntry {
                payload,
                stored_at: UNIX_EPOCH + Duration::from_millis(record.stored_at_ms),
                ttl: Duration::from_millis(record.ttl_ms),
                hit_count: 0,
                size_bytes,
            };
            table.drop_entry(&record.key);
            if let Some((_, evicted)) = table.entries.push(record.key, entry) {
                table.total_bytes = table.total_bytes.saturating_sub(evicted.size_bytes);
            }
            table.total_bytes += size_bytes;
        }
    }
}

/// Abort guard for the background sweep task.
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
