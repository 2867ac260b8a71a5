pub mod pool;

pub use pool::{PoolStats, TaskError, TaskHandle, WorkerPool};
