//! In-memory performance data layer for interactive 2-D board tooling.
//!
//! The crate has four pieces, leaf-first:
//!
//! - [`EvictionCache`]: TTL expiry, LRU eviction under a size cap, optional
//!   compression and best-effort persistence with integrity checks.
//! - [`SpatialGrid`]: uniform-grid index over 2-D positions with radius and
//!   k-nearest queries.
//! - [`WorkerPool`]: fixed pool of background execution units with a FIFO
//!   overflow queue.
//! - [`DatasetManager`]: canonical entity table with secondary indices,
//!   optional grid membership, batched mutation, and signature-keyed
//!   query-result caching.
//!
//! # Examples
//!
//! ```
//! use pitchdata::{DatasetConfig, DatasetManager, Entity, IndexKey};
//!
//! #[derive(Clone)]
//! struct Marker {
//!     id: String,
//!     team: String,
//! }
//!
//! impl Entity for Marker {
//!     fn id(&self) -> &str {
//!         &self.id
//!     }
//! }
//!
//! # fn main() -> pitchdata::Result<()> {
//! let mut manager = DatasetManager::new(DatasetConfig::default())?;
//! manager.create_index("team", |m: &Marker| Some(IndexKey::from(m.team.as_str())))?;
//!
//! manager.set(Marker { id: "7".into(), team: "home".into() });
//!
//! let home = manager.query_by_index("team", &IndexKey::from("home"))?;
//! assert_eq!(home.len(), 1);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// pitchdata Library
// ============================================================================

pub mod cache;
pub mod core;
pub mod dataset;
pub mod spatial;
pub mod worker;

mod context;

// Re-export main types for convenience
pub use crate::core::{Entity, IndexKey, Position, Result, StoreError};
pub use cache::{
    BlobStore, CacheConfig, CacheStats, Codec, EvictionCache, FileBlobStore, GzipCodec,
    MemoryBlobStore, PassthroughCodec, SweeperHandle,
};
pub use context::RuntimeContext;
pub use dataset::{BatchOp, DatasetConfig, DatasetManager, DatasetStats, Page, SecondaryIndex};
pub use spatial::{GridStats, SpatialGrid};
pub use worker::{PoolStats, TaskError, TaskHandle, WorkerPool};
