use pitchdata::{TaskError, WorkerPool};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_two_units_run_concurrently_and_third_task_queues() {
    let pool = WorkerPool::new(2).unwrap();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let blocked = pool.execute(move || {
        release_rx.recv().ok();
        "blocked"
    });
    let quick_a = pool.execute(|| "a");
    let quick_b = pool.execute(|| "b");

    // The quick tasks finish while the first is still held, proving two
    // units execute concurrently and the overflow task was queued and
    // serviced.
    assert_eq!(quick_a.join_blocking(), Ok("a"));
    assert_eq!(quick_b.join_blocking(), Ok("b"));

    release_tx.send(()).unwrap();
    assert_eq!(blocked.join_blocking(), Ok("blocked"));
}

#[test]
fn test_queue_is_fifo() {
    let pool = WorkerPool::new(1).unwrap();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (order_tx, order_rx) = mpsc::channel::<u32>();

    let gate = pool.execute(move || {
        release_rx.recv().ok();
    });
    let mut handles = Vec::new();
    for i in 0..4 {
        let order_tx = order_tx.clone();
        handles.push(pool.execute(move || {
            order_tx.send(i).ok();
        }));
    }

    release_tx.send(()).unwrap();
    gate.join_blocking().unwrap();
    for handle in handles {
        handle.join_blocking().unwrap();
    }

    let order: Vec<u32> = order_rx.try_iter().collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[test]
fn test_task_results_carry_owned_data() {
    let pool = WorkerPool::new(2).unwrap();

    // Tasks close over copies and hand results back through the handle.
    let input: Vec<i64> = (0..100).collect();
    let handle = pool.execute(move || input.iter().sum::<i64>());
    assert_eq!(handle.join_blocking(), Ok(4950));
}

#[test]
fn test_failed_task_does_not_poison_the_pool() {
    let pool = WorkerPool::new(1).unwrap();

    let failing = pool.execute(|| -> i32 { panic!("task exploded") });
    let next = pool.execute(|| 1);

    assert!(matches!(
        failing.join_blocking(),
        Err(TaskError::Panicked(message)) if message.contains("task exploded")
    ));
    assert_eq!(next.join_blocking(), Ok(1));

    let stats = pool.stats();
    assert_eq!(stats.total_units, 1);
}

#[test]
fn test_stats_reflect_queue_depth() {
    let pool = WorkerPool::new(1).unwrap();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let busy = pool.execute(move || {
        release_rx.recv().ok();
    });

    // Wait for the unit to actually go busy before queueing more.
    let deadline = Instant::now() + Duration::from_secs(2);
    while pool.stats().idle_units > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    let q1 = pool.execute(|| ());
    let q2 = pool.execute(|| ());
    assert_eq!(pool.stats().queued_tasks, 2);
    assert_eq!(pool.stats().idle_units, 0);

    release_tx.send(()).unwrap();
    busy.join_blocking().unwrap();
    q1.join_blocking().unwrap();
    q2.join_blocking().unwrap();
    assert_eq!(pool.stats().queued_tasks, 0);
}

#[tokio::test]
async fn test_handles_are_awaitable() {
    let pool = WorkerPool::new(2).unwrap();
    let handle = pool.execute(|| 6 * 7);
    assert_eq!(handle.join().await, Ok(42));
    pool.terminate();
}
