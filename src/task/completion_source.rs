//! Producer-side handle for manually resolving a task.
//!
//! A [`CompletionSource`] decouples construction of a task from the logic
//! that eventually resolves it: event callbacks, manually-signaled state,
//! or any external source of truth can hold the source and complete the
//! task when their result arrives, while consumers chain off the task as
//! usual.

use crate::error::{Error, ErrorSeq};
use crate::scheduler::SchedulerHandle;
use crate::task::{Settled, Task};

/// A producer handle that resolves its owned task exactly once.
///
/// `complete` and `fail` are callable at most once combined; a second call
/// is a programming-contract violation and fails with an invalid-state
/// error, leaving the task's state as set by the first call.
pub struct CompletionSource<T> {
    task: Task<T>,
}

impl<T: Send + 'static> CompletionSource<T> {
    pub(crate) fn new(scheduler: SchedulerHandle) -> Self {
        Self {
            task: Task::new(scheduler),
        }
    }

    /// Returns a handle to the owned task.
    #[must_use]
    pub fn task(&self) -> Task<T> {
        self.task.clone()
    }

    /// Transitions the owned task to ran-to-completion with `value`.
    pub fn complete(&self, value: T) -> crate::Result<()> {
        self.task.settle(Settled::Value(value))
    }

    /// Transitions the owned task to faulted with the given errors.
    ///
    /// The sequence must be non-empty; failing with no errors is itself an
    /// invalid-state error and leaves the task pending.
    pub fn fail(&self, errors: impl IntoIterator<Item = Error>) -> crate::Result<()> {
        let errors: ErrorSeq = errors.into_iter().collect();
        if errors.is_empty() {
            return Err(Error::invalid_state(
                "cannot fail a task with an empty error sequence",
            ));
        }
        self.task.settle(Settled::Fault(errors))
    }

    /// Transitions the owned task to faulted with a single error.
    pub fn fail_with(&self, error: Error) -> crate::Result<()> {
        self.fail(std::iter::once(error))
    }
}

impl<T> core::fmt::Debug for CompletionSource<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompletionSource")
            .field("task", &self.task.inner.id)
            .finish()
    }
}
