//! Elastic worker pool integration tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use sourced::pool::{ElasticPool, PoolConfig};

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}

#[test]
fn test_pool_grows_under_backlog_and_shrinks_when_idle() {
    let pool = ElasticPool::new(
        PoolConfig::default()
            .with_name("it-elastic")
            .with_size(2, 6)
            .with_grow_delay(Duration::from_millis(25))
            .with_idle_timeout(Duration::from_millis(150)),
    );
    let done = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let done = Arc::clone(&done);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(100));
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        })
        .collect();

    assert!(wait_until(Duration::from_secs(2), || pool.worker_count() > 2));
    assert!(pool.worker_count() <= 6);

    for handle in handles {
        handle.wait().unwrap();
    }
    assert_eq!(done.load(Ordering::SeqCst), 12);

    assert!(wait_until(Duration::from_secs(3), || pool.worker_count() == 2));
    pool.shutdown();
    assert!(pool.submit(|| ()).is_err());
}

#[tokio::test]
async fn test_task_handle_join() {
    let pool = ElasticPool::new(PoolConfig::default().with_name("it-join").with_size(1, 2));
    let handle = pool.submit(|| 6 * 7).unwrap();
    assert_eq!(handle.join().await.unwrap(), 42);
    pool.shutdown();
}
