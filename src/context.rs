//! Process-wide shared resources, explicitly constructed and torn down.

use crate::cache::{CacheConfig, EvictionCache, SweeperHandle};
use crate::core::Result;
use crate::worker::WorkerPool;
use serde_json::Value;
use std::sync::Arc;

/// Owned bundle of the shared resources an application hands to whichever
/// components need them: a derived-value cache and a worker pool.
///
/// There is deliberately no global instance. Construct one, clone the
/// inner `Arc`s for anything that needs shared access, and call
/// [`shutdown`](RuntimeContext::shutdown) (or just drop the context) when
/// the process is done with background work.
pub struct RuntimeContext {
    derived_cache: Arc<EvictionCache<String, Value>>,
    worker_pool: Arc<WorkerPool>,
    sweeper: Option<SweeperHandle>,
}

impl RuntimeContext {
    pub fn new(cache_config: CacheConfig, worker_units: usize) -> Result<Self> {
        Ok(Self {
            derived_cache: Arc::new(EvictionCache::new(cache_config)?),
            worker_pool: Arc::new(WorkerPool::new(worker_units)?),
            sweeper: None,
        })
    }

    /// Start the periodic sweep of the derived-value cache. Call from
    /// within a Tokio runtime; idempotent.
    pub fn start_maintenance(&mut self) {
        if self.sweeper.is_none() {
            self.sweeper = Some(EvictionCache::spawn_sweeper(&self.derived_cache));
        }
    }

    /// Shared cache for derived/computed objects keyed by caller-chosen
    /// strings.
    pub fn derived_cache(&self) -> &Arc<EvictionCache<String, Value>> {
        &self.derived_cache
    }

    pub fn worker_pool(&self) -> &Arc<WorkerPool> {
        &self.worker_pool
    }

    /// Stop the sweeper and terminate the pool. Idempotent; also runs on
    /// drop.
    pub fn shutdown(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        self.worker_pool.terminate();
    }
}

impl Drop for RuntimeContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_context_lifecycle() {
        let mut context = RuntimeContext::new(CacheConfig::default(), 2).unwrap();
        context.start_maintenance();
        context.start_maintenance(); // idempotent

        context
            .derived_cache()
            .set("layout:4-4-2".to_string(), json!({"rows": [4, 4, 2]}));
        assert!(context.derived_cache().has(&"layout:4-4-2".to_string()));

        let handle = context.worker_pool().execute(|| 21 * 2);
        assert_eq!(handle.join().await, Ok(42));

        context.shutdown();
        context.shutdown(); // idempotent
    }

    #[test]
    fn test_shared_access_goes_through_clones() {
        let context = RuntimeContext::new(CacheConfig::default(), 1).unwrap();
        let cache = Arc::clone(context.derived_cache());
        cache.set("k".to_string(), Value::from(1));
        assert!(context.derived_cache().has(&"k".to_string()));
    }
}
