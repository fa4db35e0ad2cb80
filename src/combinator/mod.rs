//! Combinators: compose multiple tasks into one derived task.
//!
//! Two composition rules are provided, differing in how member faults flow
//! into the derived task:
//!
//! - [`when_all`] is one-for-all: any member fault forces the combination
//!   to fault, and the combination's error sequence is the concatenation,
//!   in input order, of every failed member's own errors. Partial success
//!   is not representable.
//! - [`continue_when_all`] is the escape hatch for per-member inspection:
//!   it waits for every member to settle, then hands the full member set to
//!   a callback exactly once. The derived task reflects the callback's own
//!   outcome and never auto-faults just because a member faulted.
//!
//! Both wait for *every* member to reach a terminal state; neither
//! short-circuits on the first fault.

use crate::error::{Error, ErrorKind, ErrorSeq};
use crate::scheduler::SchedulerHandle;
use crate::task::{Settled, Task};
use parking_lot::Mutex;
use smallvec::smallvec;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Combines the aggregation rule of [`when_all`] over member outcomes.
///
/// - Any fault → `Fault` with all member errors concatenated in input order
/// - No faults, any cancellation → `Canceled`
/// - Otherwise → `Value` with member values in input order
fn aggregate_outcomes<T>(outcomes: Vec<Option<Settled<T>>>) -> Settled<Vec<T>> {
    let mut values = Vec::with_capacity(outcomes.len());
    let mut errors = ErrorSeq::new();
    let mut any_canceled = false;
    for outcome in outcomes {
        let Some(outcome) = outcome else {
            return Settled::Fault(smallvec![Error::new(ErrorKind::Internal)
                .with_message("combination completed with an unfilled member slot")]);
        };
        match outcome {
            Settled::Value(value) => values.push(value),
            Settled::Fault(member_errors) => errors.extend(member_errors),
            Settled::Canceled => any_canceled = true,
        }
    }
    if !errors.is_empty() {
        Settled::Fault(errors)
    } else if any_canceled {
        Settled::Canceled
    } else {
        Settled::Value(values)
    }
}

struct WhenAllState<T> {
    remaining: AtomicUsize,
    slots: Mutex<Vec<Option<Settled<T>>>>,
}

/// Combines tasks so the result completes only after every input settles.
///
/// All inputs succeed → ran-to-completion with the values in input order.
/// One or more fault → faulted, with the concatenation (in input order) of
/// every failed input's own error sequence; successfully produced values of
/// the other inputs are discarded from the combination and remain queryable
/// only on the inputs themselves. Canceled inputs contribute no errors; a
/// combination with no faults and at least one canceled input is canceled.
///
/// Collecting a faulted input's errors into the combination counts as
/// observing that input: the fault's ownership transfers to the combined
/// task, which is itself monitored if nobody reads it.
///
/// An empty input set completes immediately with an empty value list.
#[must_use]
pub fn when_all<T>(scheduler: &SchedulerHandle, tasks: &[Task<T>]) -> Task<Vec<T>>
where
    T: Clone + Send + 'static,
{
    let result = Task::new(scheduler.clone());
    tracing::trace!(result = %result.id(), members = tasks.len(), "when_all registered");
    if tasks.is_empty() {
        let _ = result.settle(Settled::Value(Vec::new()));
        return result;
    }

    let state = Arc::new(WhenAllState {
        remaining: AtomicUsize::new(tasks.len()),
        slots: Mutex::new((0..tasks.len()).map(|_| None).collect()),
    });
    for (index, task) in tasks.iter().enumerate() {
        let state = Arc::clone(&state);
        let result = result.clone();
        task.add_internal_continuation(move |antecedent: Task<T>| {
            let outcome = antecedent.settled_snapshot();
            if matches!(&outcome, Some(Settled::Fault(_))) {
                antecedent.mark_observed();
            }
            state.slots.lock()[index] = outcome;
            if state.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let slots = std::mem::take(&mut *state.slots.lock());
                let _ = result.settle(aggregate_outcomes(slots));
            }
        });
    }
    result
}

struct ContinueWhenAllState<T, F> {
    remaining: AtomicUsize,
    members: Mutex<Vec<Option<Task<T>>>>,
    callback: Mutex<Option<F>>,
}

/// Invokes `callback` exactly once after every input settles, regardless of
/// individual outcomes.
///
/// The callback receives the full member set, in input order, so it can
/// inspect each task's terminal state and errors independently. The derived
/// task reflects the callback's own outcome — its `Ok` value, its `Err`, or
/// a fault capturing its panic — never an aggregate of the inputs.
///
/// Unlike [`when_all`], this combinator does not consume member faults:
/// whether a faulted member counts as observed depends on whether the
/// callback (or anyone else) reads its errors.
///
/// An empty input set invokes the callback immediately with no members.
#[must_use]
pub fn continue_when_all<T, U, F>(
    scheduler: &SchedulerHandle,
    tasks: &[Task<T>],
    callback: F,
) -> Task<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(Vec<Task<T>>) -> crate::Result<U> + Send + 'static,
{
    let result = Task::new(scheduler.clone());
    tracing::trace!(result = %result.id(), members = tasks.len(), "continue_when_all registered");
    if tasks.is_empty() {
        let target = result.clone();
        scheduler.spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(move || callback(Vec::new())));
            target.settle_from_callback(outcome);
        });
        return result;
    }

    let state = Arc::new(ContinueWhenAllState {
        remaining: AtomicUsize::new(tasks.len()),
        members: Mutex::new((0..tasks.len()).map(|_| None).collect()),
        callback: Mutex::new(Some(callback)),
    });
    for (index, task) in tasks.iter().enumerate() {
        let state = Arc::clone(&state);
        let result = result.clone();
        task.add_internal_continuation(move |antecedent: Task<T>| {
            state.members.lock()[index] = Some(antecedent);
            if state.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                fire_continue_when_all(&state, &result);
            }
        });
    }
    result
}

fn fire_continue_when_all<T, U, F>(state: &ContinueWhenAllState<T, F>, result: &Task<U>)
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(Vec<Task<T>>) -> crate::Result<U> + Send + 'static,
{
    let members: Option<Vec<Task<T>>> = {
        let mut members = state.members.lock();
        members.iter_mut().map(Option::take).collect()
    };
    let callback = state.callback.lock().take();
    if let (Some(members), Some(callback)) = (members, callback) {
        let outcome = catch_unwind(AssertUnwindSafe(move || callback(members)));
        result.settle_from_callback(outcome);
    } else {
        let _ = result.settle(Settled::Fault(smallvec![Error::new(ErrorKind::Internal)
            .with_message("combination fired with a missing member or callback")]));
    }
}
