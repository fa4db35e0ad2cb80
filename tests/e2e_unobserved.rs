//! End-to-end coverage for unobserved-fault detection and escalation.
//!
//! Detection is reachability-based, so these tests assert on "eventually
//! reported exactly once", never on when a report arrives relative to
//! other work.

use promissory::test_utils::{test_scheduler, test_scheduler_with_policy};
use promissory::{ContinuationFilter, Error, EscalationPolicy, Scheduler, Task, TaskId};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn collect_reports(scheduler: &Scheduler) -> Arc<Mutex<Vec<TaskId>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    scheduler.monitor().set_handler(move |fault| {
        sink.lock().unwrap().push(fault.task_id());
        true
    });
    seen
}

/// Sweeps until at least `expected` reports arrive or a deadline passes.
fn sweep_until(scheduler: &Scheduler, expected: usize) -> usize {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut reported = scheduler.monitor().sweep();
    while reported < expected && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
        reported += scheduler.monitor().sweep();
    }
    reported
}

#[test]
fn dropped_fault_is_reported_exactly_once() {
    let scheduler = test_scheduler();
    let seen = collect_reports(&scheduler);

    let source = scheduler.completion_source::<u32>();
    let expected_id = source.task().id();
    source.fail_with(Error::work("nobody read this")).unwrap();
    drop(source);

    assert_eq!(scheduler.monitor().sweep(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![expected_id]);
    // Delivered once; later sweeps stay silent.
    assert_eq!(scheduler.monitor().sweep(), 0);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn observed_fault_is_never_reported() {
    let scheduler = test_scheduler();
    let seen = collect_reports(&scheduler);

    let source = scheduler.completion_source::<u32>();
    let task = source.task();
    source.fail_with(Error::work("boom")).unwrap();
    // Reading the fault observes it.
    assert!(task.wait().is_err());
    drop(task);
    drop(source);

    assert_eq!(scheduler.monitor().sweep(), 0);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn fault_consuming_continuation_counts_as_observation() {
    let scheduler = test_scheduler();
    let seen = collect_reports(&scheduler);

    let source = scheduler.completion_source::<u32>();
    let task = source.task();
    source.fail_with(Error::work("boom")).unwrap();

    // The callback ignores the errors entirely; the admitting filter alone
    // consumes the fault.
    let acknowledged =
        task.continue_with_filter(|_: Task<u32>| Ok(()), ContinuationFilter::OnlyOnFault);
    acknowledged.wait().unwrap();
    drop(task);
    drop(source);

    assert_eq!(sweep_after_settling(&scheduler), 0);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn excluded_filter_does_not_observe_the_fault() {
    let scheduler = test_scheduler();
    let seen = collect_reports(&scheduler);

    let source = scheduler.completion_source::<u32>();
    let task = source.task();
    let task_id = task.id();
    source.fail_with(Error::work("boom")).unwrap();

    // A success-only continuation never touches the fault.
    let skipped = task.continue_with_filter(
        |t: Task<u32>| t.value().map_err(Into::into),
        ContinuationFilter::OnlyOnSuccess,
    );
    assert!(skipped.wait().is_err());
    drop(task);
    drop(source);

    assert_eq!(sweep_until(&scheduler, 1), 1);
    assert_eq!(*seen.lock().unwrap(), vec![task_id]);
}

#[test]
fn dropped_fault_from_a_worker_is_eventually_reported() {
    let scheduler = test_scheduler();
    let seen = collect_reports(&scheduler);

    let task = scheduler.run(|| -> promissory::Result<()> { Err(Error::work("abandoned")) });
    let task_id = task.id();
    // Peek without observing until the worker settles the task.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !task.is_faulted() {
        assert!(Instant::now() < deadline, "task never faulted");
        thread::yield_now();
    }
    drop(task);

    assert_eq!(sweep_until(&scheduler, 1), 1);
    assert_eq!(*seen.lock().unwrap(), vec![task_id]);
    assert_eq!(sweep_until(&scheduler, 0), 0);
}

#[test]
fn when_all_transfers_fault_ownership_to_the_combination() {
    let scheduler = test_scheduler();
    let seen = collect_reports(&scheduler);

    let first = scheduler.completion_source::<u32>();
    let second = scheduler.completion_source::<u32>();
    let combined = scheduler.when_all(&[first.task(), second.task()]);
    first.fail_with(Error::work("a")).unwrap();
    second.fail_with(Error::work("b")).unwrap();

    // Observing the combination consumes every member fault with it.
    let fault = combined.wait().unwrap_err();
    assert_eq!(fault.len(), 2);
    drop(combined);
    drop(first);
    drop(second);

    assert_eq!(sweep_after_settling(&scheduler), 0);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn unread_combination_is_reported_instead_of_its_members() {
    let scheduler = test_scheduler();
    let seen = collect_reports(&scheduler);

    let first = scheduler.completion_source::<u32>();
    let second = scheduler.completion_source::<u32>();
    let combined = scheduler.when_all(&[first.task(), second.task()]);
    let combined_id = combined.id();
    first.fail_with(Error::work("a")).unwrap();
    second.fail_with(Error::work("b")).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !combined.is_completed() {
        assert!(Instant::now() < deadline, "combination never settled");
        thread::yield_now();
    }
    drop(combined);
    drop(first);
    drop(second);

    assert_eq!(sweep_until(&scheduler, 1), 1);
    assert_eq!(*seen.lock().unwrap(), vec![combined_id]);
}

#[test]
#[should_panic(expected = "unobserved task fault")]
fn unhandled_fault_escalates_under_the_default_policy() {
    let scheduler = test_scheduler_with_policy(EscalationPolicy::Escalate);
    let source = scheduler.completion_source::<u32>();
    source.fail_with(Error::work("nobody read this")).unwrap();
    drop(source);
    scheduler.monitor().sweep();
}

#[test]
fn log_and_continue_policy_survives_the_sweep() {
    let scheduler = test_scheduler_with_policy(EscalationPolicy::LogAndContinue);
    let source = scheduler.completion_source::<u32>();
    source.fail_with(Error::work("logged only")).unwrap();
    drop(source);
    assert_eq!(scheduler.monitor().sweep(), 1);
}

#[test]
fn handler_can_stop_escalation() {
    let scheduler = test_scheduler_with_policy(EscalationPolicy::Escalate);
    scheduler.monitor().set_handler(|_| true);
    let source = scheduler.completion_source::<u32>();
    source.fail_with(Error::work("claimed by handler")).unwrap();
    drop(source);
    // Does not panic: the handler marked the event handled.
    assert_eq!(scheduler.monitor().sweep(), 1);
}

#[test]
fn successful_and_canceled_tasks_are_never_reported() {
    let scheduler = test_scheduler();
    let seen = collect_reports(&scheduler);

    let ok = scheduler.run(|| Ok(1));
    ok.wait().unwrap();
    let canceled = ok.continue_with_filter(
        |t: Task<i32>| t.value().map_err(Into::into),
        ContinuationFilter::OnlyOnFault,
    );
    assert!(canceled.wait().is_err());
    drop(ok);
    drop(canceled);

    assert_eq!(sweep_after_settling(&scheduler), 0);
    assert!(seen.lock().unwrap().is_empty());
}

/// Gives in-flight bookkeeping continuations a moment to release their
/// handles, then sweeps once. Used only for "nothing is reported" checks.
fn sweep_after_settling(scheduler: &Scheduler) -> usize {
    thread::sleep(Duration::from_millis(50));
    scheduler.monitor().sweep()
}
