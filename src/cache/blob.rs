//! Durable byte-store collaborators for cache persistence.

use crate::core::{Result, StoreError};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key-value byte store used by cache persistence.
///
/// Implementations are best-effort local state: nothing here is assumed
/// durable across crashes or exclusive across processes. Hydration discards
/// suspect data rather than merging it.
pub trait BlobStore: Send + Sync {
    fn write(&self, namespace: &str, bytes: &[u8]) -> Result<()>;
    fn read(&self, namespace: &str) -> Result<Option<Vec<u8>>>;
    fn delete(&self, namespace: &str) -> Result<()>;
}

/// One file per namespace under a base directory. Writes go through a temp
/// file and a rename, so a crashed write never leaves a torn blob behind.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Persistence(format!("Failed to create blob directory: {e}")))?;
        Ok(Self { dir })
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.bin"))
    }
}

impl BlobStore for FileBlobStore {
    fn write(&self, namespace: &str, bytes: &[u8]) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| StoreError::Persistence(format!("Failed to create temp file: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| StoreError::Persistence(format!("Failed to write blob: {e}")))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::Persistence(format!("Failed to sync blob: {e}")))?;
        tmp.persist(self.path_for(namespace))
            .map_err(|e| StoreError::Persistence(format!("Failed to rename blob: {e}")))?;
        Ok(())
    }

    fn read(&self, namespace: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(namespace);
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| StoreError::Persistence(format!("Failed to read blob: {e}")))
    }

    fn delete(&self, namespace: &str) -> Result<()> {
        let path = self.path_for(namespace);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| StoreError::Persistence(format!("Failed to delete blob: {e}")))?;
        }
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn write(&self, namespace: &str, bytes: &[u8]) -> Result<()> {
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.insert(namespace.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, namespace: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(blobs.get(namespace).cloned())
    }

    fn delete(&self, namespace: &str) -> Result<()> {
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.remove(namespace);
        Ok(())
    }
}
