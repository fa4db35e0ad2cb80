//! Worker pool executing units of work and continuations.
//!
//! The pool manages a set of OS threads separate from every caller: code
//! that schedules work or registers continuations never blocks, and nothing
//! the pool runs ever executes inline in a caller's thread.
//!
//! # Thread Lifecycle
//!
//! Threads are spawned lazily up to `max_threads` when work queues behind
//! busy workers. When idle beyond a threshold, threads above `min_threads`
//! retire. Work items carry no result channel of their own; tasks track
//! their own completion state, so the pool only needs fire-and-forget
//! closures and a FIFO queue.
//!
//! # Shutdown
//!
//! `shutdown` stops intake and wakes idle workers; `shutdown_and_wait`
//! additionally joins worker threads within a bounded drain timeout.

use crossbeam_queue::SegQueue;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle as ThreadJoinHandle};
use std::time::Duration;

/// Default idle timeout before retiring excess threads.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

type Work = Box<dyn FnOnce() + Send + 'static>;

/// A cloneable handle to the worker pool.
#[derive(Clone)]
pub(crate) struct WorkerPoolHandle {
    inner: Arc<PoolInner>,
}

impl WorkerPoolHandle {
    /// Enqueues a closure for execution on a pool thread.
    ///
    /// Work submitted after shutdown is dropped.
    pub(crate) fn spawn(&self, work: Work) {
        if self.inner.shutdown.load(Ordering::Acquire) {
            tracing::warn!("work submitted after shutdown was dropped");
            return;
        }
        self.inner.queue.push(work);
        self.inner.pending_count.fetch_add(1, Ordering::Relaxed);

        maybe_spawn_thread(&self.inner);
        self.inner.notify_one();
    }

    /// Returns the number of queued items not yet picked up by a worker.
    pub(crate) fn pending_count(&self) -> usize {
        self.inner.pending_count.load(Ordering::Relaxed)
    }

    /// Returns the number of live worker threads.
    pub(crate) fn active_threads(&self) -> usize {
        self.inner.active_threads.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for WorkerPoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPoolHandle")
            .field("active_threads", &self.active_threads())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// The worker pool owning the threads.
pub(crate) struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    /// Minimum number of threads kept alive.
    min_threads: usize,
    /// Maximum number of threads allowed.
    max_threads: usize,
    /// Current number of live threads.
    active_threads: AtomicUsize,
    /// Number of threads currently executing work.
    busy_threads: AtomicUsize,
    /// Number of queued items.
    pending_count: AtomicUsize,
    /// FIFO work queue.
    queue: SegQueue<Work>,
    /// Intake stops once set.
    shutdown: AtomicBool,
    /// Parking for idle workers.
    condvar: Condvar,
    mutex: Mutex<()>,
    /// Idle timeout for threads above the minimum.
    idle_timeout: Duration,
    /// Worker thread name prefix.
    thread_name_prefix: String,
    /// Callback when a worker thread starts.
    on_thread_start: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Callback when a worker thread stops.
    on_thread_stop: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Join handles for cleanup.
    thread_handles: Mutex<Vec<ThreadJoinHandle<()>>>,
}

impl PoolInner {
    fn notify_one(&self) {
        let _guard = self.mutex.lock().unwrap();
        self.condvar.notify_one();
    }

    fn notify_all(&self) {
        let _guard = self.mutex.lock().unwrap();
        self.condvar.notify_all();
    }
}

/// Configuration options for the worker pool.
#[derive(Clone)]
pub(crate) struct PoolOptions {
    pub(crate) idle_timeout: Duration,
    pub(crate) thread_name_prefix: String,
    pub(crate) on_thread_start: Option<Arc<dyn Fn() + Send + Sync>>,
    pub(crate) on_thread_stop: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            thread_name_prefix: "promissory".to_string(),
            on_thread_start: None,
            on_thread_stop: None,
        }
    }
}

impl WorkerPool {
    /// Creates a pool with the given thread limits.
    ///
    /// # Panics
    ///
    /// Panics if `max_threads` is 0.
    pub(crate) fn with_options(
        min_threads: usize,
        max_threads: usize,
        options: PoolOptions,
    ) -> Self {
        assert!(max_threads > 0, "max_threads must be at least 1");
        let max_threads = max_threads.max(min_threads);

        let inner = Arc::new(PoolInner {
            min_threads,
            max_threads,
            active_threads: AtomicUsize::new(0),
            busy_threads: AtomicUsize::new(0),
            pending_count: AtomicUsize::new(0),
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
            idle_timeout: options.idle_timeout,
            thread_name_prefix: options.thread_name_prefix,
            on_thread_start: options.on_thread_start,
            on_thread_stop: options.on_thread_stop,
            thread_handles: Mutex::new(Vec::with_capacity(max_threads)),
        });

        let pool = Self { inner };
        for _ in 0..min_threads {
            spawn_thread(&pool.inner);
        }
        pool
    }

    /// Returns a cloneable handle to this pool.
    pub(crate) fn handle(&self) -> WorkerPoolHandle {
        WorkerPoolHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Stops intake and wakes idle workers. Queued work still runs.
    pub(crate) fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.notify_all();
    }

    /// Shuts down and joins worker threads.
    ///
    /// Returns `true` if every thread exited within `timeout`.
    pub(crate) fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();

        let deadline = std::time::Instant::now() + timeout;
        while self.inner.active_threads.load(Ordering::Acquire) > 0 {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                tracing::warn!("worker pool drain timed out");
                return false;
            }
            self.inner.notify_all();
            thread::sleep(Duration::from_millis(10).min(remaining));
        }

        let mut handles = self.inner.thread_handles.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
        true
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("min_threads", &self.inner.min_threads)
            .field("max_threads", &self.inner.max_threads)
            .field(
                "active_threads",
                &self.inner.active_threads.load(Ordering::Relaxed),
            )
            .field(
                "pending",
                &self.inner.pending_count.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
        let _ = self.shutdown_and_wait(Duration::from_secs(5));
    }
}

fn spawn_thread(inner: &Arc<PoolInner>) {
    let inner_clone = Arc::clone(inner);
    let thread_id = inner.active_threads.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}-worker-{}", inner.thread_name_prefix, thread_id);

    let handle = thread::Builder::new()
        .name(name)
        .spawn(move || {
            if let Some(callback) = &inner_clone.on_thread_start {
                callback();
            }

            worker_loop(&inner_clone);

            if let Some(callback) = &inner_clone.on_thread_stop {
                callback();
            }
            inner_clone.active_threads.fetch_sub(1, Ordering::Relaxed);
        })
        .expect("failed to spawn worker thread");

    inner.thread_handles.lock().unwrap().push(handle);
}

fn maybe_spawn_thread(inner: &Arc<PoolInner>) {
    let active = inner.active_threads.load(Ordering::Relaxed);
    let busy = inner.busy_threads.load(Ordering::Relaxed);
    let pending = inner.pending_count.load(Ordering::Relaxed);

    // Grow only when every live thread is busy and work is queued.
    if active < inner.max_threads && busy >= active && pending > 0 {
        spawn_thread(inner);
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        if let Some(work) = inner.queue.pop() {
            inner.pending_count.fetch_sub(1, Ordering::Relaxed);
            inner.busy_threads.fetch_add(1, Ordering::Relaxed);
            work();
            inner.busy_threads.fetch_sub(1, Ordering::Relaxed);
            continue;
        }

        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        let active = inner.active_threads.load(Ordering::Relaxed);
        if active > inner.min_threads {
            let guard = inner.mutex.lock().unwrap();
            let (guard, result) = inner
                .condvar
                .wait_timeout(guard, inner.idle_timeout)
                .unwrap();
            drop(guard);
            if result.timed_out()
                && inner.queue.is_empty()
                && inner.active_threads.load(Ordering::Relaxed) > inner.min_threads
            {
                // Idle beyond the threshold; retire this thread.
                break;
            }
        } else {
            let guard = inner.mutex.lock().unwrap();
            let _guard = inner.condvar.wait(guard).unwrap();
        }
    }
}
