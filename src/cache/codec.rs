//! Reversible byte transforms for large cache values.

use crate::core::{Result, StoreError};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

/// A reversible byte transform.
///
/// The only load-bearing law is `decode(encode(x)) == x` for every input;
/// size reduction is best-effort. Implementations are chosen once at cache
/// construction, never probed per call.
pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Gzip-backed codec.
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    pub fn new() -> Self {
        Self {
            level: Compression::fast(),
        }
    }

    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(bytes)
            .map_err(|e| StoreError::Codec(format!("gzip encode failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| StoreError::Codec(format!("gzip encode failed: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| StoreError::Codec(format!("gzip decode failed: {e}")))?;
        Ok(out)
    }
}

/// Identity transform for environments where the accelerated codec is
/// unavailable or unwanted.
#[derive(Debug, Default)]
pub struct PassthroughCodec;

impl Codec for PassthroughCodec {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
