//! Fixed-size pool of background execution units.

use crate::core::{Result, StoreError};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::oneshot;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a task handle did not produce a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task canceled before completion")]
    Canceled,
}

/// Receiving side of a dispatched task.
pub struct TaskHandle<R> {
    rx: oneshot::Receiver<std::result::Result<R, TaskError>>,
}

impl<R> TaskHandle<R> {
    /// Wait for the task result. Resolves with [`TaskError::Canceled`] if
    /// the pool was terminated before the task ran.
    pub async fn join(self) -> std::result::Result<R, TaskError> {
        self.rx.await.unwrap_or(Err(TaskError::Canceled))
    }

    /// Blocking variant for synchronous callers. Must not be called from
    /// inside an async runtime.
    pub fn join_blocking(self) -> std::result::Result<R, TaskError> {
        self.rx.blocking_recv().unwrap_or(Err(TaskError::Canceled))
    }
}

struct QueueState {
    jobs: VecDeque<Job>,
    idle_units: usize,
    shutdown: bool,
}

struct PoolShared {
    queue: Mutex<QueueState>,
    work_ready: Condvar,
}

fn lock_queue(shared: &PoolShared) -> MutexGuard<'_, QueueState> {
    shared.queue.lock().unwrap_or_else(|e| e.into_inner())
}

fn unit_loop(shared: Arc<PoolShared>) {
    loop {
        let job = {
            let mut state = lock_queue(&shared);
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(job) = state.jobs.pop_front() {
                    // Claiming the job and going busy happen under the same
                    // lock, so no two units can own one dispatch.
                    state.idle_units -= 1;
                    break job;
                }
                state = shared
                    .work_ready
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            }
        };
        job();
        lock_queue(&shared).idle_units += 1;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Pool of worker threads draining a FIFO task queue.
///
/// Tasks must close over copies of whatever data they need; the pool gives
/// them no way to reach shared state, and results flow back through each
/// task's handle. A panic inside a task rejects that task's handle only;
/// the unit recovers and services the next queued task.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    units: Mutex<Vec<JoinHandle<()>>>,
    total_units: usize,
}

impl WorkerPool {
    pub fn new(total_units: usize) -> Result<Self> {
        if total_units == 0 {
            return Err(StoreError::InvalidConfig(
                "worker pool needs at least one unit".to_string(),
            ));
        }
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                idle_units: total_units,
                shutdown: false,
            }),
            work_ready: Condvar::new(),
        });

        let mut units = Vec::with_capacity(total_units);
        for i in 0..total_units {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("pitchdata-unit-{i}"))
                .spawn(move || unit_loop(shared))
                .map_err(|e| StoreError::WorkerPool(format!("Failed to spawn unit: {e}")))?;
            units.push(handle);
        }

        Ok(Self {
            shared,
            units: Mutex::new(units),
            total_units,
        })
    }

    /// Submit a task. It runs on the first idle unit, or queues FIFO when
    /// every unit is busy.
    pub fn execute<F, R>(&self, task: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task));
            let result = match outcome {
                Ok(value) => Ok(value),
                Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
            };
            // The caller may have dropped the handle; that is fine.
            let _ = tx.send(result);
        });

        {
            let mut state = lock_queue(&self.shared);
            if state.shutdown {
                // Dropping the job drops its sender; the handle resolves
                // with Canceled.
                return TaskHandle { rx };
            }
            state.jobs.push_back(job);
        }
        self.shared.work_ready.notify_one();
        TaskHandle { rx }
    }

    pub fn stats(&self) -> PoolStats {
        let state = lock_queue(&self.shared);
        PoolStats {
            total_units: self.total_units,
            idle_units: state.idle_units,
            queued_tasks: state.jobs.len(),
        }
    }

    /// Stop the pool: discard the queue (those handles resolve with
    /// [`TaskError::Canceled`]), signal shutdown, and join every unit. A
    /// unit mid-task finishes its current task before exiting. Idempotent.
    pub fn terminate(&self) {
        {
            let mut state = lock_queue(&self.shared);
            state.shutdown = true;
            state.jobs.clear();
        }
        self.shared.work_ready.notify_all();

        let mut units = self.units.lock().unwrap_or_else(|e| e.into_inner());
        for handle in units.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Pool occupancy statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_units: usize,
    pub idle_units: usize,
    pub queued_tasks: usize,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} units idle, {} queued",
            self.idle_units, self.total_units, self.queued_tasks
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_rejects_zero_units() {
        assert!(WorkerPool::new(0).is_err());
    }

    #[test]
    fn test_executes_task() {
        let pool = WorkerPool::new(2).unwrap();
        let handle = pool.execute(|| 2 + 2);
        assert_eq!(handle.join_blocking(), Ok(4));
    }

    #[test]
    fn test_units_run_concurrently_and_overflow_queues() {
        let pool = WorkerPool::new(2).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // Unit 1 blocks until signaled; tasks 2 and 3 are quick.
        let blocked = pool.execute(move || {
            release_rx.recv().ok();
            "blocked"
        });
        let quick_a = pool.execute(|| "a");
        let quick_b = pool.execute(|| "b");

        // Both quick tasks complete while the first is still blocked,
        // proving two units run concurrently and the third task queued.
        assert_eq!(quick_a.join_blocking(), Ok("a"));
        assert_eq!(quick_b.join_blocking(), Ok("b"));

        release_tx.send(()).unwrap();
        assert_eq!(blocked.join_blocking(), Ok("blocked"));
    }

    #[test]
    fn test_panic_rejects_only_that_task() {
        let pool = WorkerPool::new(1).unwrap();

        let bad = pool.execute(|| -> i32 { panic!("boom") });
        let good = pool.execute(|| 7);

        assert_eq!(
            bad.join_blocking(),
            Err(TaskError::Panicked("boom".to_string()))
        );
        assert_eq!(good.join_blocking(), Ok(7));
    }

    #[test]
    fn test_terminate_cancels_queued_tasks() {
        let pool = WorkerPool::new(1).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let running = pool.execute(move || {
            release_rx.recv().ok();
            9
        });
        let queued = pool.execute(|| 42);

        // terminate() discards the queue immediately, then blocks joining
        // the busy unit until the releaser lets its task finish.
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            release_tx.send(()).ok();
        });
        pool.terminate();
        releaser.join().unwrap();

        assert_eq!(running.join_blocking(), Ok(9));
        assert_eq!(queued.join_blocking(), Err(TaskError::Canceled));

        // Submitting after terminate also resolves canceled.
        let late = pool.execute(|| 1);
        assert_eq!(late.join_blocking(), Err(TaskError::Canceled));
    }

    #[test]
    fn test_stats() {
        let pool = WorkerPool::new(2).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.total_units, 2);
        assert_eq!(stats.idle_units, 2);
        assert_eq!(stats.queued_tasks, 0);

        let (release_tx, release_rx) = mpsc::channel::<()>();
        let busy = pool.execute(move || {
            release_rx.recv().ok();
        });

        // Wait for the unit to pick the task up.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while pool.stats().idle_units == 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pool.stats().idle_units, 1);

        release_tx.send(()).unwrap();
        busy.join_blocking().unwrap();
    }

    #[tokio::test]
    async fn test_join_from_async_context() {
        let pool = WorkerPool::new(2).unwrap();
        let handle = pool.execute(|| "done");
        assert_eq!(handle.join().await, Ok("done"));
    }
}
