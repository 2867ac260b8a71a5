use crate::core::{Result, StoreError};
use std::time::Duration;

/// Cache behaviour knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of live entries; the least-recently-used entry is
    /// reclaimed beyond this.
    pub max_entries: usize,

    /// TTL applied when a caller does not supply one.
    pub default_ttl: Duration,

    /// Write a bounded snapshot to the blob store after each set.
    pub persist: bool,

    /// Route large values through the codec.
    pub compress: bool,

    /// Cadence of the background expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            default_ttl: Duration::from_secs(300), // 5 minutes
            persist: false,
            compress: false,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    /// Set the maximum number of entries
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the default TTL
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Enable or disable write-through persistence
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Enable or disable compression of large values
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Set the background sweep cadence
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(StoreError::InvalidConfig(
                "max_entries must be > 0".to_string(),
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(StoreError::InvalidConfig(
                "default_ttl must be non-zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(StoreError::InvalidConfig(
                "sweep_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
