pub mod blob;
pub mod codec;
pub mod config;
pub mod eviction;
pub mod stats;

pub use blob::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use codec::{Codec, GzipCodec, PassthroughCodec};
pub use config::CacheConfig;
pub use eviction::{EvictionCache, SweeperHandle};
pub use stats::CacheStats;
