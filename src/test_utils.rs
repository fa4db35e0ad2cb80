//! Test utilities.
//!
//! Shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Scheduler constructors producing isolated monitor instances per test
//! - An assertion macro for aggregate fault shapes

use crate::monitor::EscalationPolicy;
use crate::scheduler::Scheduler;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Creates a small scheduler for tests.
///
/// Uses an isolated fault monitor with [`EscalationPolicy::LogAndContinue`]
/// so a test that deliberately drops faults cannot take the harness down.
#[must_use]
pub fn test_scheduler() -> Scheduler {
    init_test_logging();
    Scheduler::builder()
        .worker_threads(1, 4)
        .thread_name_prefix("promissory-test")
        .escalation_policy(EscalationPolicy::LogAndContinue)
        .build()
        .expect("failed to build test scheduler")
}

/// Creates a test scheduler with an explicit escalation policy.
#[must_use]
pub fn test_scheduler_with_policy(policy: EscalationPolicy) -> Scheduler {
    init_test_logging();
    Scheduler::builder()
        .worker_threads(1, 4)
        .thread_name_prefix("promissory-test")
        .escalation_policy(policy)
        .build()
        .expect("failed to build test scheduler")
}

/// Assert that an aggregate fault wraps exactly the expected number of
/// causes.
#[macro_export]
macro_rules! assert_fault_causes {
    ($result:expr, $expected:expr) => {
        match $result {
            Err(fault) => assert_eq!(
                fault.len(),
                $expected,
                "expected {} cause(s), got {}: {}",
                $expected,
                fault.len(),
                fault
            ),
            Ok(_) => panic!("expected a fault with {} cause(s), got Ok", $expected),
        }
    };
}
