//! The task handle: a single-assignment future with owned continuations.
//!
//! # Semantics
//!
//! A [`Task`] is a cheap, cloneable handle over shared completion state.
//! The state is written exactly once by the single completing actor (a
//! worker finishing the unit of work, or a [`CompletionSource`] call) and is
//! read-only afterwards.
//!
//! Continuations registered through [`Task::continue_with`] run after the
//! antecedent settles, on a worker thread, never inline in the registering
//! caller — registration against an already-terminal task fires the
//! continuation on the next scheduler turn, preserving the same ordering
//! guarantees as the pending case. Completion happens-before every
//! continuation dispatch; sibling continuations of one antecedent are
//! unordered relative to each other.
//!
//! # Observation
//!
//! [`Task::value`], [`Task::wait`] and [`Task::errors`] are *observing*
//! accessors: reading a fault through them marks it as seen, which keeps the
//! task out of the scheduler's unobserved-fault monitor. [`Task::status`]
//! and the `is_*` inspectors are non-observing peeks.

mod completion_source;
mod state;

pub use completion_source::CompletionSource;
pub use state::TaskStatus;

pub(crate) use state::{ContinuationEntry, Settled, TaskCore};

use crate::error::{AggregateFault, Error, ErrorKind};
use crate::scheduler::SchedulerHandle;
use crate::types::{ContinuationId, TaskId};
use parking_lot::{Condvar, Mutex};
use smallvec::smallvec;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Selects which antecedent outcomes a continuation runs for.
///
/// A continuation whose filter excludes the antecedent's actual outcome is
/// never invoked; its task completes as [`TaskStatus::Canceled`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContinuationFilter {
    /// Run for every terminal outcome.
    #[default]
    Always,
    /// Run only when the antecedent ran to completion.
    OnlyOnSuccess,
    /// Run only when the antecedent faulted.
    OnlyOnFault,
}

impl ContinuationFilter {
    /// Returns true if a continuation with this filter runs for an
    /// antecedent in the given terminal status.
    #[must_use]
    pub const fn admits(&self, status: TaskStatus) -> bool {
        match self {
            Self::Always => status.is_terminal(),
            Self::OnlyOnSuccess => matches!(status, TaskStatus::RanToCompletion),
            Self::OnlyOnFault => matches!(status, TaskStatus::Faulted),
        }
    }

    /// Returns true if this filter admits faulted antecedents.
    #[must_use]
    pub const fn admits_fault(&self) -> bool {
        matches!(self, Self::Always | Self::OnlyOnFault)
    }
}

struct TaskInner<T> {
    id: TaskId,
    core: Mutex<TaskCore<T>>,
    terminal: Condvar,
    observed: AtomicBool,
    scheduler: SchedulerHandle,
}

impl<T> Drop for TaskInner<T> {
    fn drop(&mut self) {
        if *self.observed.get_mut() {
            return;
        }
        if let Some(errors) = self.core.get_mut().fault_errors() {
            self.scheduler
                .monitor()
                .report_unobserved(self.id, errors.to_vec());
        }
    }
}

/// A handle to a single-assignment deferred computation.
///
/// Clones share the same completion state; dropping the last handle to a
/// faulted task whose errors were never read reports it to the scheduler's
/// fault monitor.
pub struct Task<T> {
    inner: Arc<TaskInner<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> core::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("status", &self.inner.core.lock().status())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Task<T> {
    pub(crate) fn new(scheduler: SchedulerHandle) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                id: TaskId::next(),
                core: Mutex::new(TaskCore::new()),
                terminal: Condvar::new(),
                observed: AtomicBool::new(false),
                scheduler,
            }),
        }
    }

    /// Returns this task's stable identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// Returns the current status without observing the task.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.inner.core.lock().status()
    }

    /// Returns true if the task reached any terminal state.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status().is_terminal()
    }

    /// Returns true if the task faulted.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.status() == TaskStatus::Faulted
    }

    /// Returns true if the task was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.status() == TaskStatus::Canceled
    }

    /// Returns true if the task produced a value.
    #[must_use]
    pub fn is_ran_to_completion(&self) -> bool {
        self.status() == TaskStatus::RanToCompletion
    }

    /// Blocks until the task settles, discarding the value.
    ///
    /// Observing accessor. A faulted task yields an [`AggregateFault`] with
    /// the full error sequence; repeated calls yield the same aggregate. A
    /// canceled task yields an aggregate wrapping a single canceled-kind
    /// error.
    ///
    /// Blocking a worker of the same pool on another of its tasks risks
    /// starvation; keeping that safe is the caller's responsibility.
    pub fn wait(&self) -> Result<(), AggregateFault> {
        let mut core = self.inner.core.lock();
        loop {
            if let Some(settled) = &core.settled {
                let result = match settled {
                    Settled::Value(_) => Ok(()),
                    Settled::Fault(errors) => Err(AggregateFault::new(errors.clone())),
                    Settled::Canceled => Err(canceled_fault()),
                };
                drop(core);
                self.mark_observed();
                return result;
            }
            self.inner.terminal.wait(&mut core);
        }
    }

    /// Returns the error sequence of a faulted task, or `None` if the task
    /// is pending, succeeded, or was canceled.
    ///
    /// Observing accessor: reading the errors of a faulted task marks the
    /// fault as seen. Does not block.
    #[must_use]
    pub fn errors(&self) -> Option<Vec<Error>> {
        let errors = {
            let core = self.inner.core.lock();
            core.fault_errors().map(<[Error]>::to_vec)
        };
        if errors.is_some() {
            self.mark_observed();
        }
        errors
    }

    /// Registers a continuation that runs for every terminal outcome.
    ///
    /// Equivalent to [`Task::continue_with_filter`] with
    /// [`ContinuationFilter::Always`].
    pub fn continue_with<U, F>(&self, callback: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(Task<T>) -> crate::Result<U> + Send + 'static,
    {
        self.continue_with_filter(callback, ContinuationFilter::Always)
    }

    /// Registers `callback` to run after this task settles, subject to
    /// `filter`.
    ///
    /// Returns a new task representing the continuation's own outcome: the
    /// callback's `Ok` value, its `Err`, a fault capturing its panic, or
    /// [`TaskStatus::Canceled`] when the filter excludes the antecedent's
    /// actual outcome (in which case the callback is never invoked).
    ///
    /// The callback runs on a worker thread, possibly a different one than
    /// the antecedent's, and never synchronously inside this call.
    pub fn continue_with_filter<U, F>(&self, callback: F, filter: ContinuationFilter) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(Task<T>) -> crate::Result<U> + Send + 'static,
    {
        let result = Task::<U>::new(self.inner.scheduler.clone());
        let target = result.clone();
        let entry = ContinuationEntry {
            id: ContinuationId::next(),
            filter,
            callback: Box::new(move |antecedent: Task<T>| {
                run_continuation(&antecedent, &target, filter, callback);
            }),
        };
        self.register(entry);
        result
    }

    /// Queues a bookkeeping continuation that bypasses filter-cancellation
    /// and fault-observation side effects. Combinators use this to watch
    /// their inputs.
    pub(crate) fn add_internal_continuation(
        &self,
        callback: impl FnOnce(Task<T>) + Send + 'static,
    ) {
        self.register(ContinuationEntry {
            id: ContinuationId::next(),
            filter: ContinuationFilter::Always,
            callback: Box::new(callback),
        });
    }

    fn register(&self, entry: ContinuationEntry<T>) {
        let immediate = {
            let mut core = self.inner.core.lock();
            core.push_continuation(entry)
        };
        // Already terminal: fire on the next scheduler turn, never inline.
        if let Some(entry) = immediate {
            self.dispatch(entry);
        }
    }

    fn dispatch(&self, entry: ContinuationEntry<T>) {
        let ContinuationEntry {
            id,
            filter,
            callback,
        } = entry;
        tracing::trace!(
            task = %self.id(),
            continuation = %id,
            filter = ?filter,
            "dispatching continuation"
        );
        let antecedent = self.clone();
        self.inner.scheduler.spawn(move || callback(antecedent));
    }

    /// Applies the one-way transition and dispatches drained continuations.
    ///
    /// Fails with an invalid-state error if the task is already terminal.
    pub(crate) fn settle(&self, outcome: Settled<T>) -> crate::Result<()> {
        let drained = {
            let mut core = self.inner.core.lock();
            core.settle(outcome)?
        };
        self.inner.terminal.notify_all();
        tracing::trace!(
            task = %self.id(),
            status = %self.status(),
            continuations = drained.len(),
            "task settled"
        );
        for entry in drained {
            self.dispatch(entry);
        }
        Ok(())
    }

    /// Settles this task from a callback outcome, converting panics and
    /// errors into a single-entry fault.
    pub(crate) fn settle_from_callback(&self, outcome: std::thread::Result<crate::Result<T>>) {
        let settled = match outcome {
            Ok(Ok(value)) => Settled::Value(value),
            Ok(Err(error)) => Settled::Fault(smallvec![error]),
            Err(payload) => Settled::Fault(smallvec![Error::from_panic(payload.as_ref())]),
        };
        let _ = self.settle(settled);
    }

    pub(crate) fn mark_observed(&self) {
        self.inner.observed.store(true, Ordering::Release);
    }
}

impl<T: Clone + Send + 'static> Task<T> {
    /// Blocks until the task settles and returns its value.
    ///
    /// Observing accessor with the same blocking and fault contract as
    /// [`Task::wait`].
    pub fn value(&self) -> Result<T, AggregateFault> {
        let mut core = self.inner.core.lock();
        loop {
            if let Some(settled) = &core.settled {
                let result = match settled {
                    Settled::Value(value) => Ok(value.clone()),
                    Settled::Fault(errors) => Err(AggregateFault::new(errors.clone())),
                    Settled::Canceled => Err(canceled_fault()),
                };
                drop(core);
                self.mark_observed();
                return result;
            }
            self.inner.terminal.wait(&mut core);
        }
    }

    /// Clones the terminal payload, or returns `None` while pending.
    pub(crate) fn settled_snapshot(&self) -> Option<Settled<T>> {
        let core = self.inner.core.lock();
        core.settled.as_ref().map(Settled::snapshot)
    }
}

fn canceled_fault() -> AggregateFault {
    AggregateFault::single(
        Error::new(ErrorKind::Canceled).with_message("task was canceled before producing a value"),
    )
}

fn run_continuation<T, U, F>(
    antecedent: &Task<T>,
    target: &Task<U>,
    filter: ContinuationFilter,
    callback: F,
) where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(Task<T>) -> crate::Result<U>,
{
    let status = antecedent.status();
    if !filter.admits(status) {
        tracing::trace!(
            task = %antecedent.id(),
            status = %status,
            filter = ?filter,
            "continuation filter excluded outcome, canceling"
        );
        let _ = target.settle(Settled::Canceled);
        return;
    }
    if status == TaskStatus::Faulted && filter.admits_fault() {
        // The continuation consumes the fault on behalf of the caller.
        antecedent.mark_observed();
    }
    let antecedent = antecedent.clone();
    let outcome = catch_unwind(AssertUnwindSafe(move || callback(antecedent)));
    target.settle_from_callback(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_scheduler;

    #[test]
    fn filter_admission_table() {
        use ContinuationFilter::{Always, OnlyOnFault, OnlyOnSuccess};
        use TaskStatus::{Canceled, Faulted, Pending, RanToCompletion};

        assert!(Always.admits(RanToCompletion));
        assert!(Always.admits(Faulted));
        assert!(Always.admits(Canceled));
        assert!(!Always.admits(Pending));

        assert!(OnlyOnSuccess.admits(RanToCompletion));
        assert!(!OnlyOnSuccess.admits(Faulted));
        assert!(!OnlyOnSuccess.admits(Canceled));

        assert!(OnlyOnFault.admits(Faulted));
        assert!(!OnlyOnFault.admits(RanToCompletion));
        assert!(!OnlyOnFault.admits(Canceled));

        assert!(Always.admits_fault());
        assert!(OnlyOnFault.admits_fault());
        assert!(!OnlyOnSuccess.admits_fault());
    }

    #[test]
    fn settle_is_single_writer() {
        let scheduler = test_scheduler();
        let task: Task<u32> = Task::new(scheduler.handle());
        task.settle(Settled::Value(1)).unwrap();
        let err = task.settle(Settled::Value(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(task.value().unwrap(), 1);
    }

    #[test]
    fn status_peek_does_not_block() {
        let scheduler = test_scheduler();
        let task: Task<u32> = Task::new(scheduler.handle());
        assert_eq!(task.status(), TaskStatus::Pending);
        assert!(!task.is_completed());
    }

    #[test]
    fn canceled_read_yields_canceled_aggregate() {
        let scheduler = test_scheduler();
        let task: Task<u32> = Task::new(scheduler.handle());
        task.settle(Settled::Canceled).unwrap();
        let fault = task.value().unwrap_err();
        assert_eq!(fault.len(), 1);
        assert_eq!(fault.errors()[0].kind(), ErrorKind::Canceled);
    }

    #[test]
    fn errors_returns_none_for_success() {
        let scheduler = test_scheduler();
        let task: Task<u32> = Task::new(scheduler.handle());
        task.settle(Settled::Value(5)).unwrap();
        assert!(task.errors().is_none());
    }
}
