use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Index '{0}' already exists")]
    IndexExists(String),

    #[error("Index '{0}' not found")]
    IndexNotFound(String),

    #[error("No spatial grid attached")]
    NoSpatialIndex,

    #[error("No worker pool attached")]
    NoWorkerPool,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
