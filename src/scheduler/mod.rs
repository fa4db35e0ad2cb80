//! Scheduler: worker pool, continuation dispatch, and fault monitoring.
//!
//! The scheduler owns the two process-level pieces of state the task model
//! needs: the worker-thread pool that runs units of work and continuations,
//! and the [`FaultMonitor`] that collects faults nobody observed. Both have
//! an explicit init-at-build / drain-at-shutdown lifecycle and are reached
//! through handles rather than ambient globals, so tests can construct
//! isolated instances per case.

mod builder;
mod worker_pool;

pub use builder::{SchedulerBuilder, SchedulerConfig};

use crate::combinator;
use crate::error::Error;
use crate::monitor::FaultMonitor;
use crate::task::{CompletionSource, Task};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use worker_pool::{WorkerPool, WorkerPoolHandle};

/// Owns the worker pool and fault monitor backing a set of tasks.
///
/// Dropping the scheduler shuts the pool down after a bounded drain; tasks
/// already settled stay readable, and their handles keep the monitor alive
/// for unobserved-fault reporting.
#[derive(Debug)]
pub struct Scheduler {
    pool: WorkerPool,
    monitor: FaultMonitor,
}

impl Scheduler {
    /// Creates a scheduler with default configuration.
    pub fn new() -> crate::Result<Self> {
        SchedulerBuilder::new().build()
    }

    /// Returns a builder for custom configuration.
    #[must_use]
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Constructs a scheduler from the given configuration.
    pub fn with_config(config: SchedulerConfig) -> crate::Result<Self> {
        if config.max_workers == 0 {
            return Err(Error::config("max_workers must be at least 1"));
        }
        if config.min_workers > config.max_workers {
            return Err(Error::config("min_workers must not exceed max_workers"));
        }
        let pool = WorkerPool::with_options(
            config.min_workers,
            config.max_workers,
            config.pool_options(),
        );
        let monitor = FaultMonitor::new(config.escalation_policy);
        tracing::debug!(
            min_workers = config.min_workers,
            max_workers = config.max_workers,
            policy = ?config.escalation_policy,
            "scheduler started"
        );
        Ok(Self { pool, monitor })
    }

    /// Returns a cloneable handle for scheduling work and creating tasks.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            pool: self.pool.handle(),
            monitor: self.monitor.clone(),
        }
    }

    /// Returns the unobserved-fault monitor owned by this scheduler.
    #[must_use]
    pub fn monitor(&self) -> &FaultMonitor {
        &self.monitor
    }

    /// Schedules `unit_of_work` on a worker distinct from the caller.
    ///
    /// See [`SchedulerHandle::run`].
    pub fn run<T, F>(&self, unit_of_work: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce() -> crate::Result<T> + Send + 'static,
    {
        self.handle().run(unit_of_work)
    }

    /// Creates a completion source whose task this scheduler services.
    #[must_use]
    pub fn completion_source<T: Send + 'static>(&self) -> CompletionSource<T> {
        self.handle().completion_source()
    }

    /// Combines tasks so the result completes once every input is terminal,
    /// aggregating faults. See [`combinator::when_all`].
    #[must_use]
    pub fn when_all<T>(&self, tasks: &[Task<T>]) -> Task<Vec<T>>
    where
        T: Clone + Send + 'static,
    {
        combinator::when_all(&self.handle(), tasks)
    }

    /// Invokes `callback` once every input is terminal, regardless of
    /// individual outcomes. See [`combinator::continue_when_all`].
    #[must_use]
    pub fn continue_when_all<T, U, F>(&self, tasks: &[Task<T>], callback: F) -> Task<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: FnOnce(Vec<Task<T>>) -> crate::Result<U> + Send + 'static,
    {
        combinator::continue_when_all(&self.handle(), tasks, callback)
    }

    /// Drains the worker pool, then sweeps the fault monitor once.
    ///
    /// Returns `true` if every worker exited within `timeout`. The final
    /// sweep applies the configured escalation policy to any fault still
    /// unreported at teardown.
    pub fn shutdown(self, timeout: Duration) -> bool {
        let drained = self.pool.shutdown_and_wait(timeout);
        let reported = self.monitor.sweep();
        tracing::debug!(drained, reported, "scheduler shut down");
        drained
    }
}

/// A cloneable handle to a [`Scheduler`].
///
/// Tasks hold one of these to dispatch their continuations and to reach the
/// fault monitor; it remains valid for reporting after the scheduler itself
/// is dropped.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    pool: WorkerPoolHandle,
    monitor: FaultMonitor,
}

impl SchedulerHandle {
    /// Schedules `unit_of_work` on a worker thread and returns its task.
    ///
    /// The returned task is pending immediately; the calling thread never
    /// blocks. A unit of work that returns `Err` faults the task with that
    /// single error; one that panics faults it with a captured panic-kind
    /// error.
    pub fn run<T, F>(&self, unit_of_work: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce() -> crate::Result<T> + Send + 'static,
    {
        let task = Task::new(self.clone());
        let completer = task.clone();
        tracing::trace!(task = %task.id(), "unit of work scheduled");
        self.spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(unit_of_work));
            completer.settle_from_callback(outcome);
        });
        task
    }

    /// Creates a completion source whose task this scheduler services.
    #[must_use]
    pub fn completion_source<T: Send + 'static>(&self) -> CompletionSource<T> {
        CompletionSource::new(self.clone())
    }

    /// Returns the fault monitor this handle reports to.
    #[must_use]
    pub fn monitor(&self) -> &FaultMonitor {
        &self.monitor
    }

    pub(crate) fn spawn(&self, work: impl FnOnce() + Send + 'static) {
        self.pool.spawn(Box::new(work));
    }
}
