//! Internal task state machine.
//!
//! This module defines the record structure behind a task handle. The state
//! transition is exactly one-way and one-time:
//!
//! ```text
//! Pending → { RanToCompletion(value) | Faulted(errors) | Canceled }
//! ```
//!
//! The terminal payload is written by the single completing actor and is
//! never mutated afterwards. The continuation list is the only shared
//! mutable state: the completing actor drains it exactly once, and late
//! registrations are handed back to the caller for immediate dispatch.

use crate::error::{Error, ErrorSeq};
use crate::types::ContinuationId;

use super::{ContinuationFilter, Task};

/// The public status of a task, for peeking without observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Not yet terminal.
    Pending,
    /// The unit of work produced a value.
    RanToCompletion,
    /// The unit of work (or a combinator input) failed.
    Faulted,
    /// The task was canceled, e.g. by a continuation filter that excluded
    /// the antecedent's actual outcome.
    Canceled,
}

impl TaskStatus {
    /// Returns true if this status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Self::Pending => "pending",
            Self::RanToCompletion => "ran-to-completion",
            Self::Faulted => "faulted",
            Self::Canceled => "canceled",
        };
        f.write_str(text)
    }
}

/// The terminal payload of a task.
pub(crate) enum Settled<T> {
    /// Completed with a value.
    Value(T),
    /// Failed with a non-empty, ordered error sequence.
    Fault(ErrorSeq),
    /// Canceled without producing a value or errors.
    Canceled,
}

impl<T> Settled<T> {
    pub(crate) fn status(&self) -> TaskStatus {
        match self {
            Self::Value(_) => TaskStatus::RanToCompletion,
            Self::Fault(_) => TaskStatus::Faulted,
            Self::Canceled => TaskStatus::Canceled,
        }
    }
}

impl<T: Clone> Settled<T> {
    pub(crate) fn snapshot(&self) -> Self {
        match self {
            Self::Value(v) => Self::Value(v.clone()),
            Self::Fault(errors) => Self::Fault(errors.clone()),
            Self::Canceled => Self::Canceled,
        }
    }
}

/// A registered continuation waiting for its antecedent to settle.
///
/// The callback receives a handle to the antecedent at dispatch time; it is
/// deliberately not captured at registration time, so a pending continuation
/// never keeps its own task alive through a reference cycle.
pub(crate) struct ContinuationEntry<T> {
    pub(crate) id: ContinuationId,
    pub(crate) filter: ContinuationFilter,
    pub(crate) callback: Box<dyn FnOnce(Task<T>) + Send>,
}

impl<T> std::fmt::Debug for ContinuationEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationEntry")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("callback", &"<closure>")
            .finish()
    }
}

/// The record behind a task handle, guarded by the handle's lock.
pub(crate) struct TaskCore<T> {
    pub(crate) settled: Option<Settled<T>>,
    continuations: Vec<ContinuationEntry<T>>,
}

impl<T> TaskCore<T> {
    pub(crate) const fn new() -> Self {
        Self {
            settled: None,
            continuations: Vec::new(),
        }
    }

    pub(crate) fn status(&self) -> TaskStatus {
        self.settled
            .as_ref()
            .map_or(TaskStatus::Pending, Settled::status)
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.settled.is_some()
    }

    /// Applies the single one-way transition.
    ///
    /// On success, returns the drained continuation list so the caller can
    /// dispatch it outside the lock. Fails with an invalid-state error if
    /// the task is already terminal, and with an internal error if a fault
    /// carries no causes.
    pub(crate) fn settle(
        &mut self,
        outcome: Settled<T>,
    ) -> Result<Vec<ContinuationEntry<T>>, Error> {
        if self.is_terminal() {
            return Err(Error::invalid_state(
                "task already reached a terminal state",
            ));
        }
        if matches!(&outcome, Settled::Fault(errors) if errors.is_empty()) {
            return Err(Error::new(crate::ErrorKind::Internal)
                .with_message("faulted task must carry at least one error"));
        }
        self.settled = Some(outcome);
        Ok(std::mem::take(&mut self.continuations))
    }

    /// Queues a continuation if the task is still pending.
    ///
    /// Returns the entry back to the caller when the task is already
    /// terminal; the caller must then dispatch it itself.
    pub(crate) fn push_continuation(
        &mut self,
        entry: ContinuationEntry<T>,
    ) -> Option<ContinuationEntry<T>> {
        if self.is_terminal() {
            Some(entry)
        } else {
            self.continuations.push(entry);
            None
        }
    }

    pub(crate) fn fault_errors(&self) -> Option<&[Error]> {
        match &self.settled {
            Some(Settled::Fault(errors)) => Some(errors),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn entry() -> ContinuationEntry<u32> {
        ContinuationEntry {
            id: ContinuationId::next(),
            filter: ContinuationFilter::Always,
            callback: Box::new(|_| {}),
        }
    }

    #[test]
    fn new_core_is_pending() {
        let core: TaskCore<u32> = TaskCore::new();
        assert_eq!(core.status(), TaskStatus::Pending);
        assert!(!core.is_terminal());
    }

    #[test]
    fn settle_value_transitions_to_ran_to_completion() {
        let mut core: TaskCore<u32> = TaskCore::new();
        let drained = core.settle(Settled::Value(7)).unwrap();
        assert!(drained.is_empty());
        assert_eq!(core.status(), TaskStatus::RanToCompletion);
    }

    #[test]
    fn terminal_state_is_absorbing() {
        let mut core: TaskCore<u32> = TaskCore::new();
        core.settle(Settled::Value(7)).unwrap();
        let err = core.settle(Settled::Canceled).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidState);
        assert_eq!(core.status(), TaskStatus::RanToCompletion);
    }

    #[test]
    fn settle_drains_queued_continuations_once() {
        let mut core: TaskCore<u32> = TaskCore::new();
        assert!(core.push_continuation(entry()).is_none());
        assert!(core.push_continuation(entry()).is_none());
        let drained = core.settle(Settled::Canceled).unwrap();
        assert_eq!(drained.len(), 2);
    }

    #[test]
    fn push_after_terminal_hands_entry_back() {
        let mut core: TaskCore<u32> = TaskCore::new();
        core.settle(Settled::Value(1)).unwrap();
        assert!(core.push_continuation(entry()).is_some());
    }

    #[test]
    fn empty_fault_sequence_is_rejected() {
        let mut core: TaskCore<u32> = TaskCore::new();
        let err = core.settle(Settled::Fault(smallvec![])).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Internal);
        assert!(!core.is_terminal());
    }

    #[test]
    fn fault_errors_accessor() {
        let mut core: TaskCore<u32> = TaskCore::new();
        assert!(core.fault_errors().is_none());
        core.settle(Settled::Fault(smallvec![Error::work("boom")]))
            .unwrap();
        let errors = core.fault_errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message(), Some("boom"));
    }

    #[test]
    fn status_display() {
        assert_eq!(TaskStatus::Pending.to_string(), "pending");
        assert_eq!(TaskStatus::Faulted.to_string(), "faulted");
        assert!(TaskStatus::Canceled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }
}
