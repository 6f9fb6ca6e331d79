//! Elastic pool implementation.
//!
//! Lock order: `Shared::state` is the only mutex; workers never run a task
//! while holding it.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::oneshot;

use super::handle::TaskHandle;
use crate::error::{Result, SourcedError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Configuration for the ElasticPool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Thread name prefix
    pub name: String,
    /// Workers kept alive while the pool accepts work
    pub core_size: usize,
    /// Hard upper bound on the number of workers
    pub max_size: usize,
    /// Delay between backlog checks that may add one worker
    pub grow_delay: Duration,
    /// Time an idle worker above `core_size` waits before exiting
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "sourced-pool".to_string(),
            core_size: 1,
            max_size: 32,
            grow_delay: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl PoolConfig {
    /// Set the thread name prefix.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set minimum and maximum worker counts.
    pub fn with_size(mut self, core_size: usize, max_size: usize) -> Self {
        self.core_size = core_size;
        self.max_size = max_size.max(1).max(core_size);
        self
    }

    /// Set the growth watchdog delay.
    pub fn with_grow_delay(mut self, delay: Duration) -> Self {
        self.grow_delay = delay;
        self
    }

    /// Set the idle timeout for surplus workers.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

#[derive(Default)]
struct PoolState {
    tasks: VecDeque<Job>,
    /// Live workers, including ones that are about to start.
    workers: usize,
    /// Workers currently blocked waiting for a task.
    idle: usize,
    watchdog_armed: bool,
}

enum Growth {
    SpawnNow,
    ArmWatchdog,
    None,
}

struct Shared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    task_ready: Condvar,
    all_exited: Condvar,
    accepting: AtomicBool,
    next_worker_id: AtomicUsize,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread pool that grows under sustained backlog and shrinks when idle
pub struct ElasticPool {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ElasticPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticPool")
            .field("name", &self.shared.config.name)
            .field("workers", &self.worker_count())
            .finish_non_exhaustive()
    }
}

impl ElasticPool {
    /// Create a pool and start its core workers.
    pub fn new(config: PoolConfig) -> Self {
        let core_size = config.core_size;
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(PoolState::default()),
            task_ready: Condvar::new(),
            all_exited: Condvar::new(),
            accepting: AtomicBool::new(true),
            next_worker_id: AtomicUsize::new(1),
        });

        shared.lock_state().workers = core_size;
        for _ in 0..core_size {
            spawn_worker(&shared);
        }

        Self { shared }
    }

    /// Queue a task and return a handle to its result.
    ///
    /// Fails with `Rejected` once [`ElasticPool::shutdown`] was called.
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(task)).map_err(|panic| {
                let message = panic_message(panic.as_ref());
                error!("Pool task panicked: {}", message);
                SourcedError::TaskPanicked(message)
            });
            // receiver may be gone if the caller dropped the handle
            let _ = tx.send(outcome);
        });

        let action = {
            let mut state = self.shared.lock_state();
            // checked under the lock so no worker retires between the check and the push
            if !self.shared.accepting.load(Ordering::SeqCst) {
                return Err(SourcedError::Rejected(format!(
                    "pool {} is shutting down",
                    self.shared.config.name
                )));
            }

            state.tasks.push_back(job);
            debug!(
                "Queued task on {} ({} waiting, {} workers, {} idle)",
                self.shared.config.name,
                state.tasks.len(),
                state.workers,
                state.idle
            );

            if state.workers == 0 {
                state.workers += 1;
                Growth::SpawnNow
            } else if state.tasks.len() > state.idle && !state.watchdog_armed {
                // idle workers may not have woken yet, so compare against the backlog
                state.watchdog_armed = true;
                Growth::ArmWatchdog
            } else {
                Growth::None
            }
        };
        self.shared.task_ready.notify_one();

        match action {
            Growth::SpawnNow => spawn_worker(&self.shared),
            Growth::ArmWatchdog => arm_watchdog(&self.shared),
            Growth::None => {}
        }

        Ok(TaskHandle::new(rx))
    }

    /// Stop accepting new tasks. Queued and running tasks still complete.
    pub fn shutdown(&self) {
        if self.shared.accepting.swap(false, Ordering::SeqCst) {
            info!("Shutting down pool {}", self.shared.config.name);
        }
        // hold the lock so no worker misses the wakeup between its check and wait
        let _state = self.shared.lock_state();
        self.shared.task_ready.notify_all();
    }

    /// Block until every worker thread has exited.
    ///
    /// Returns only when `core_size` is zero or [`ElasticPool::shutdown`] was
    /// called and the backlog drained.
    pub fn await_idle(&self) {
        let mut state = self.shared.lock_state();
        while state.workers > 0 {
            state = self
                .shared
                .all_exited
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Whether the pool still accepts submissions
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Current number of live workers
    pub fn worker_count(&self) -> usize {
        self.shared.lock_state().workers
    }

    /// Number of tasks waiting for a worker
    pub fn queued(&self) -> usize {
        self.shared.lock_state().tasks.len()
    }

    /// The configuration this pool was created with
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

impl Drop for ElasticPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start one worker thread. The caller has already counted it in `workers`.
fn spawn_worker(shared: &Arc<Shared>) {
    let id = shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}-{}", shared.config.name, id);
    let worker_shared = shared.clone();

    if let Err(e) = thread::Builder::new()
        .name(name.clone())
        .spawn(move || run_worker(worker_shared))
    {
        error!("Failed to spawn worker {}: {}", name, e);
        let mut state = shared.lock_state();
        state.workers -= 1;
        if state.workers == 0 {
            shared.all_exited.notify_all();
        }
    }
}

fn run_worker(shared: Arc<Shared>) {
    info!("Starting worker thread");
    while let Some(job) = next_job(&shared) {
        job();
    }
    info!("No more tasks waiting. Worker thread exiting");
}

/// Pop the next task, or `None` when this worker should exit.
fn next_job(shared: &Shared) -> Option<Job> {
    let mut state = shared.lock_state();
    loop {
        if let Some(job) = state.tasks.pop_front() {
            return Some(job);
        }

        if !shared.accepting.load(Ordering::SeqCst) {
            return retire(shared, state);
        }

        state.idle += 1;
        let (guard, wait) = shared
            .task_ready
            .wait_timeout(state, shared.config.idle_timeout)
            .unwrap_or_else(PoisonError::into_inner);
        state = guard;
        state.idle -= 1;

        if wait.timed_out() && state.tasks.is_empty() && state.workers > shared.config.core_size {
            return retire(shared, state);
        }
    }
}

fn retire(shared: &Shared, mut state: MutexGuard<'_, PoolState>) -> Option<Job> {
    state.workers -= 1;
    if state.workers == 0 {
        shared.all_exited.notify_all();
    }
    None
}

/// Start the growth watchdog. It adds one worker per `grow_delay` while the
/// backlog persists and disarms itself once the queue is empty or the pool
/// is at `max_size`.
fn arm_watchdog(shared: &Arc<Shared>) {
    let weak = Arc::downgrade(shared);
    let delay = shared.config.grow_delay;
    let name = format!("{}-watchdog", shared.config.name);

    if let Err(e) = thread::Builder::new()
        .name(name)
        .spawn(move || run_watchdog(weak, delay))
    {
        error!("Failed to spawn pool watchdog: {}", e);
        shared.lock_state().watchdog_armed = false;
    }
}

fn run_watchdog(weak: Weak<Shared>, delay: Duration) {
    loop {
        thread::sleep(delay);
        let Some(shared) = weak.upgrade() else {
            return;
        };

        let grow = {
            let mut state = shared.lock_state();
            let grow = !state.tasks.is_empty() && state.workers < shared.config.max_size;
            if grow {
                state.workers += 1;
                info!(
                    "Backlog of {} tasks on {}, adding worker {}",
                    state.tasks.len(),
                    shared.config.name,
                    state.workers
                );
            } else {
                state.watchdog_armed = false;
            }
            grow
        };

        if !grow {
            return;
        }
        spawn_worker(&shared);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fast_config(core: usize, max: usize) -> PoolConfig {
        PoolConfig::default()
            .with_name("test-pool")
            .with_size(core, max)
            .with_grow_delay(Duration::from_millis(50))
            .with_idle_timeout(Duration::from_millis(200))
    }

    fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        check()
    }

    #[test]
    fn test_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.core_size, 1);
        assert_eq!(config.max_size, 32);
        assert_eq!(config.grow_delay, Duration::from_secs(1));
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_with_size_clamps_max() {
        let config = PoolConfig::default().with_size(4, 2);
        assert_eq!(config.core_size, 4);
        assert_eq!(config.max_size, 4);
    }

    #[test]
    fn test_starts_core_workers() {
        let pool = ElasticPool::new(fast_config(2, 4));
        assert_eq!(pool.worker_count(), 2);
    }

    #[test]
    fn test_submit_returns_result() {
        let pool = ElasticPool::new(fast_config(1, 2));
        let handle = pool.submit(|| 21 * 2).unwrap();
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    fn test_zero_core_spawns_on_demand() {
        let pool = ElasticPool::new(fast_config(0, 2));
        assert_eq!(pool.worker_count(), 0);
        let handle = pool.submit(|| "done").unwrap();
        assert_eq!(handle.wait().unwrap(), "done");
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let pool = ElasticPool::new(fast_config(1, 1));
        let failed = pool.submit(|| -> i32 { panic!("connector exploded") }).unwrap();
        match failed.wait() {
            Err(SourcedError::TaskPanicked(msg)) => assert!(msg.contains("connector exploded")),
            other => panic!("unexpected result: {:?}", other),
        }

        let next = pool.submit(|| 5).unwrap();
        assert_eq!(next.wait().unwrap(), 5);
        assert_eq!(pool.worker_count(), 1);
    }

    #[test]
    fn test_submit_after_shutdown_rejected() {
        let pool = ElasticPool::new(fast_config(1, 1));
        pool.shutdown();
        assert!(!pool.is_accepting());
        let result = pool.submit(|| ());
        assert!(matches!(result, Err(SourcedError::Rejected(_))));
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let pool = ElasticPool::new(fast_config(1, 1));
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let counter = counter.clone();
                pool.submit(move || {
                    thread::sleep(Duration::from_millis(20));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        pool.shutdown();
        pool.await_idle();

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(pool.worker_count(), 0);
        for handle in handles {
            assert!(handle.wait().is_ok());
        }
    }

    #[test]
    fn test_grows_under_backlog_and_shrinks_when_idle() {
        let pool = ElasticPool::new(fast_config(1, 3));
        let handles: Vec<_> = (0..8)
            .map(|_| pool.submit(|| thread::sleep(Duration::from_millis(150))).unwrap())
            .collect();

        assert!(wait_until(Duration::from_secs(2), || pool.worker_count() > 1));

        let mut peak = 0;
        for handle in handles {
            peak = peak.max(pool.worker_count());
            handle.wait().unwrap();
        }
        assert!(peak <= 3);

        assert!(wait_until(Duration::from_secs(3), || pool.worker_count() == 1));
    }

    #[test]
    fn test_never_exceeds_max() {
        let pool = ElasticPool::new(fast_config(1, 2));
        let handles: Vec<_> = (0..10)
            .map(|_| pool.submit(|| thread::sleep(Duration::from_millis(40))).unwrap())
            .collect();

        for handle in handles {
            assert!(pool.worker_count() <= 2);
            handle.wait().unwrap();
        }
    }

    #[test]
    fn test_await_idle_with_zero_core_returns_after_timeout() {
        let pool = ElasticPool::new(fast_config(0, 2));
        pool.submit(|| ()).unwrap().wait().unwrap();
        pool.await_idle();
        assert_eq!(pool.worker_count(), 0);
        assert!(pool.is_accepting());
    }
}
