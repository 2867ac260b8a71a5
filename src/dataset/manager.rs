//! Canonical entity table with derived indices, spatial membership, and
//! signature-keyed result caching.

use crate::cache::{CacheConfig, EvictionCache};
use crate::core::{Entity, IndexKey, Position, Result, StoreError};
use crate::dataset::index::SecondaryIndex;
use crate::spatial::{GridStats, SpatialGrid};
use crate::worker::{PoolStats, TaskHandle, WorkerPool};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type PositionExtractor<T> = Box<dyn Fn(&T) -> Option<Position> + Send + Sync>;

/// One mutation executed inside [`DatasetManager::batch`].
pub type BatchOp<T> = Box<dyn FnOnce(&mut DatasetManager<T>)>;

/// Dataset behaviour knobs.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Mutations since the last rebuild that trigger a full index rebuild.
    pub rebuild_threshold: u64,

    /// Configuration of the query-result cache.
    pub result_cache: CacheConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            rebuild_threshold: 500,
            result_cache: CacheConfig::default()
                .max_entries(200)
                .default_ttl(Duration::from_secs(30)),
        }
    }
}

impl DatasetConfig {
    /// Set the rebuild threshold
    pub fn rebuild_threshold(mut self, threshold: u64) -> Self {
        self.rebuild_threshold = threshold;
        self
    }

    /// Set the result cache configuration
    pub fn result_cache(mut self, config: CacheConfig) -> Self {
        self.result_cache = config;
        self
    }
}

/// One page of entities.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Aggregated dataset statistics.
#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub entities: usize,
    pub indices: usize,
    pub cached_results: usize,
    pub change_count: u64,
    pub grid: Option<GridStats>,
    pub pool: Option<PoolStats>,
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dataset Stats: {} entities, {} indices, {} cached results, {} changes",
            self.entities, self.indices, self.cached_results, self.change_count
        )
    }
}

fn index_signature(name: &str, key: &IndexKey) -> String {
    format!("idx:{}:{}", name, key.signature())
}

fn is_spatial_signature(key: &String) -> bool {
    key.starts_with("radius:") || key.starts_with("nearest:")
}

/// Owner of the canonical entity table.
///
/// Every mutation goes through [`set`]/[`delete`] (or [`batch`]), which keep
/// the secondary indices, the spatial grid, and the query-result cache
/// consistent with the table as one unit. Read paths either hit the result
/// cache or fall through to an index or grid lookup; cached results hold id
/// lists that are resolved against the live table at hit time, so a cached
/// signature can never yield entity content that disagrees with the table.
///
/// The manager is a single-writer type: all mutation is `&mut self` and
/// runs to completion, so there is no internal locking and no intermediate
/// state to observe. Do not re-enter the manager from inside a batch
/// closure's own callbacks.
///
/// [`set`]: DatasetManager::set
/// [`delete`]: DatasetManager::delete
/// [`batch`]: DatasetManager::batch
pub struct DatasetManager<T> {
    entities: BTreeMap<String, T>,
    indices: BTreeMap<String, SecondaryIndex<T>>,
    grid: Option<SpatialGrid>,
    position_of: Option<PositionExtractor<T>>,
    pool: Option<Arc<WorkerPool>>,
    results: EvictionCache<String, Vec<String>>,
    config: DatasetConfig,
    change_count: u64,
    changes_since_rebuild: u64,
    in_batch: bool,
    batch_dirty: bool,
}

impl<T: Entity> DatasetManager<T> {
    pub fn new(config: DatasetConfig) -> Result<Self> {
        let results = EvictionCache::new(config.result_cache.clone())?;
        Ok(Self {
            entities: BTreeMap::new(),
            indices: BTreeMap::new(),
            grid: None,
            position_of: None,
            pool: None,
            results,
            config,
            change_count: 0,
            changes_since_rebuild: 0,
            in_batch: false,
            batch_dirty: false,
        })
    }

    /// Attach a spatial grid. Existing entities are placed immediately via
    /// the extractor; later mutations keep membership current.
    pub fn with_spatial_grid<F>(mut self, mut grid: SpatialGrid, extract: F) -> Self
    where
        F: Fn(&T) -> Option<Position> + Send + Sync + 'static,
    {
        for (id, entity) in &self.entities {
            if let Some(position) = extract(entity) {
                grid.insert(id.clone(), position.x, position.y);
            }
        }
        self.grid = Some(grid);
        self.position_of = Some(Box::new(extract));
        self
    }

    /// Attach a worker pool for offloaded computation and stats
    /// aggregation. Pool tasks operate on copies (see [`snapshot`]), never
    /// on the manager's own state.
    ///
    /// [`snapshot`]: DatasetManager::snapshot
    pub fn with_worker_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Insert or replace an entity, keeping all derived state consistent.
    pub fn set(&mut self, entity: T) {
        let id = entity.id().to_string();
        let prior = self.entities.get(&id).cloned();
        let in_batch = self.in_batch;

        for index in self.indices.values_mut() {
            let old_key = prior.as_ref().and_then(|p| index.key_of(p));
            let new_key = index.key_of(&entity);
            if prior.is_some() && old_key == new_key {
                // Membership in this index is unchanged; cached id lists
                // for the key stay valid because results resolve live.
                continue;
            }
            if let Some(key) = &old_key {
                index.remove(key, &id);
            }
            if let Some(key) = new_key.clone() {
                index.add(key, &id);
            }
            if !in_batch {
                for key in old_key.iter().chain(new_key.iter()) {
                    self.results.delete(&index_signature(index.name(), key));
                }
            }
        }

        if let (Some(grid), Some(extract)) = (self.grid.as_mut(), self.position_of.as_ref()) {
            let old_pos = prior.as_ref().and_then(|p| extract(p));
            let new_pos = extract(&entity);
            if old_pos != new_pos {
                match new_pos {
                    Some(position) => grid.insert(id.clone(), position.x, position.y),
                    None => {
                        grid.remove(&id);
                    }
                }
                if !in_batch {
                    self.results.delete_if(is_spatial_signature);
                }
            }
        }

        self.entities.insert(id, entity);
        self.bump_changes();
    }

    /// Remove an entity and tear down all derived state for it.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(entity) = self.entities.remove(id) else {
            return false;
        };
        let in_batch = self.in_batch;

        for index in self.indices.values_mut() {
            if let Some(key) = index.key_of(&entity) {
                index.remove(&key, id);
                if !in_batch {
                    self.results.delete(&index_signature(index.name(), &key));
                }
            }
        }

        if let Some(grid) = self.grid.as_mut() {
            if grid.remove(id) && !in_batch {
                self.results.delete_if(is_spatial_signature);
            }
        }

        self.bump_changes();
        true
    }

    /// Direct table lookup.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.entities.get(id)
    }

    /// Register a secondary index, built immediately with a full table
    /// scan and kept current by subsequent mutations.
    pub fn create_index<F>(&mut self, name: impl Into<String>, extract: F) -> Result<()>
    where
        F: Fn(&T) -> Option<IndexKey> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.indices.contains_key(&name) {
            return Err(StoreError::IndexExists(name));
        }
        let mut index = SecondaryIndex::new(name.clone(), Box::new(extract));
        index.rebuild(self.entities.iter());
        self.indices.insert(name.clone(), index);

        let prefix = format!("idx:{name}:");
        self.results.delete_if(|key| key.starts_with(&prefix));
        Ok(())
    }

    /// Drop a secondary index and its cached results.
    pub fn drop_index(&mut self, name: &str) -> bool {
        if self.indices.remove(name).is_none() {
            return false;
        }
        let prefix = format!("idx:{name}:");
        self.results.delete_if(|key| key.starts_with(&prefix));
        true
    }

    /// Entities whose extracted key equals `key`, in id order.
    pub fn query_by_index(&self, name: &str, key: &IndexKey) -> Result<Vec<T>> {
        let index = self
            .indices
            .get(name)
            .ok_or_else(|| StoreError::IndexNotFound(name.to_string()))?;
        let signature = index_signature(name, key);

        if !self.in_batch {
            if let Some(ids) = self.results.get(&signature) {
                return Ok(self.resolve(&ids));
            }
        }

        let mut ids: Vec<String> = index
            .lookup(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        let items = self.resolve(&ids);
        if !self.in_batch {
            self.results.set(signature, ids);
        }
        Ok(items)
    }

    /// Entities within `radius` of `(x, y)`.
    pub fn query_by_position(&self, x: f64, y: f64, radius: f64) -> Result<Vec<T>> {
        let grid = self.grid.as_ref().ok_or(StoreError::NoSpatialIndex)?;
        let signature = format!("radius:{x}:{y}:{radius}");

        if !self.in_batch {
            if let Some(ids) = self.results.get(&signature) {
                return Ok(self.resolve(&ids));
            }
        }

        let mut ids = grid.query_radius(x, y, radius);
        ids.sort();
        let items = self.resolve(&ids);
        if !self.in_batch {
            self.results.set(signature, ids);
        }
        Ok(items)
    }

    /// The `k` entities closest to `(x, y)`, nearest first.
    pub fn get_nearest(&self, x: f64, y: f64, k: usize) -> Result<Vec<T>> {
        let grid = self.grid.as_ref().ok_or(StoreError::NoSpatialIndex)?;
        let signature = format!("nearest:{x}:{y}:{k}");

        if !self.in_batch {
            if let Some(ids) = self.results.get(&signature) {
                return Ok(self.resolve(&ids));
            }
        }

        // Distance order matters here; do not sort.
        let ids = grid.query_nearest(x, y, k);
        let items = self.resolve(&ids);
        if !self.in_batch {
            self.results.set(signature, ids);
        }
        Ok(items)
    }

    /// Run a list of mutations with the result cache held empty, clearing
    /// it once at the end instead of invalidating per mutation. Readers
    /// inside the batch window bypass the cache entirely.
    pub fn batch(&mut self, ops: Vec<BatchOp<T>>) {
        self.results.clear();
        self.in_batch = true;
        self.batch_dirty = false;
        for op in ops {
            op(self);
        }
        self.in_batch = false;
        if self.batch_dirty {
            self.results.clear();
            self.batch_dirty = false;
        }
        self.maybe_rebuild();
    }

    /// Clear and repopulate every secondary index from the table. This is
    /// the designed recovery mechanism for index drift; cached results are
    /// dropped with it.
    pub fn rebuild_indexes(&mut self) {
        let entities = &self.entities;
        for index in self.indices.values_mut() {
            index.rebuild(entities.iter());
        }
        self.changes_since_rebuild = 0;
        self.results.clear();
    }

    /// Entities in id order, one page at a time.
    pub fn get_paginated(&self, offset: usize, limit: usize) -> Page<T> {
        Page {
            items: self
                .entities
                .values()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
            total: self.entities.len(),
        }
    }

    /// Every entity, in id order. Unbounded; avoid on latency-sensitive
    /// paths over very large tables.
    pub fn get_all(&self) -> Vec<T> {
        self.entities.values().cloned().collect()
    }

    /// Copy of the table for offloading pure computations to the worker
    /// pool.
    pub fn snapshot(&self) -> Vec<T> {
        self.get_all()
    }

    /// Run a pure function over a snapshot of the table on the attached
    /// worker pool. The task owns its copy; the manager stays usable while
    /// it runs.
    pub fn offload<F, R>(&self, task: F) -> Result<TaskHandle<R>>
    where
        T: Send + 'static,
        F: FnOnce(Vec<T>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let pool = self.pool.as_ref().ok_or(StoreError::NoWorkerPool)?;
        let snapshot = self.snapshot();
        Ok(pool.execute(move || task(snapshot)))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn change_count(&self) -> u64 {
        self.change_count
    }

    pub fn worker_pool(&self) -> Option<&Arc<WorkerPool>> {
        self.pool.as_ref()
    }

    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            entities: self.entities.len(),
            indices: self.indices.len(),
            cached_results: self.results.len(),
            change_count: self.change_count,
            grid: self.grid.as_ref().map(SpatialGrid::stats),
            pool: self.pool.as_ref().map(|pool| pool.stats()),
        }
    }

    fn resolve(&self, ids: &[String]) -> Vec<T> {
        ids.iter()
            .filter_map(|id| self.entities.get(id).cloned())
            .collect()
    }

    fn bump_changes(&mut self) {
        self.change_count += 1;
        self.changes_since_rebuild += 1;
        if self.in_batch {
            self.batch_dirty = true;
        } else {
            self.maybe_rebuild();
        }
    }

    fn maybe_rebuild(&mut self) {
        if self.changes_since_rebuild > self.config.rebuild_threshold {
            log::debug!(
                "Rebuilding {} indices after {} changes",
                self.indices.len(),
                self.changes_since_rebuild
            );
            self.rebuild_indexes();
        }
    }
}
