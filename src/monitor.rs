//! Unobserved-fault monitoring.
//!
//! A fault nobody reads is a silent data-loss bug waiting to be found in
//! production. Every faulted task whose errors were never observed reports
//! itself here when its last handle is released; a sweep then drains the
//! reports and either hands each to a registered handler or applies the
//! escalation policy.
//!
//! # Lifecycle
//!
//! One monitor exists per scheduler, created at build time and swept a
//! final time at shutdown. Components reach it through cloned handles
//! rather than ambient global state, so tests construct isolated instances
//! per case.
//!
//! # Detection model
//!
//! Detection is reachability-based: a task reports when its last
//! reference-counted handle drops while the task is faulted and unobserved.
//! This trades the timing nondeterminism of finalization-based detection
//! for a deterministic "eventually reported exactly once" guarantee; tests
//! should assert on that, never on when a report arrives relative to other
//! work.

use crate::error::{AggregateFault, Error};
use crate::types::TaskId;
use core::fmt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Handler = Arc<dyn Fn(&UnobservedFault) -> bool + Send + Sync>;

/// What happens to an unobserved fault that no handler claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EscalationPolicy {
    /// Panic, taking the process down. The historical fail-fast default.
    #[default]
    Escalate,
    /// Emit a structured error log and keep running.
    LogAndContinue,
}

/// A fault that was dropped without any caller reading it.
#[derive(Debug, Clone)]
pub struct UnobservedFault {
    task_id: TaskId,
    errors: Vec<Error>,
}

impl UnobservedFault {
    /// Returns the id of the task that carried the fault.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the dropped error sequence in its original order.
    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Wraps the dropped errors in an aggregate, as an observer would have
    /// received them.
    #[must_use]
    pub fn aggregate(&self) -> AggregateFault {
        AggregateFault::new(self.errors.iter().cloned().collect())
    }
}

impl fmt::Display for UnobservedFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task {} dropped {} unobserved error(s)",
            self.task_id,
            self.errors.len()
        )?;
        for (i, error) in self.errors.iter().enumerate() {
            write!(f, "; [{i}] {error}")?;
        }
        Ok(())
    }
}

struct MonitorInner {
    pending: Mutex<Vec<UnobservedFault>>,
    handler: Mutex<Option<Handler>>,
    policy: Mutex<EscalationPolicy>,
    reported_total: AtomicU64,
}

/// Tracks faulted tasks whose errors were never read.
///
/// Cloning shares the same underlying state.
#[derive(Clone)]
pub struct FaultMonitor {
    inner: Arc<MonitorInner>,
}

impl FaultMonitor {
    pub(crate) fn new(policy: EscalationPolicy) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                pending: Mutex::new(Vec::new()),
                handler: Mutex::new(None),
                policy: Mutex::new(policy),
                reported_total: AtomicU64::new(0),
            }),
        }
    }

    /// Installs the handler invoked for each swept fault.
    ///
    /// Returning `true` marks the fault handled and stops escalation for
    /// it; returning `false` hands it to the escalation policy. Replaces
    /// any previously installed handler.
    pub fn set_handler(&self, handler: impl Fn(&UnobservedFault) -> bool + Send + Sync + 'static) {
        *self.inner.handler.lock() = Some(Arc::new(handler));
    }

    /// Removes the installed handler, restoring pure policy behavior.
    pub fn clear_handler(&self) {
        *self.inner.handler.lock() = None;
    }

    /// Replaces the escalation policy.
    pub fn set_policy(&self, policy: EscalationPolicy) {
        *self.inner.policy.lock() = policy;
    }

    /// Returns the current escalation policy.
    #[must_use]
    pub fn policy(&self) -> EscalationPolicy {
        *self.inner.policy.lock()
    }

    /// Returns the number of reports awaiting the next sweep.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Returns how many faults have ever been reported to this monitor.
    #[must_use]
    pub fn reported_total(&self) -> u64 {
        self.inner.reported_total.load(Ordering::Relaxed)
    }

    /// Called by a task dropping its last handle while faulted-and-unread.
    pub(crate) fn report_unobserved(&self, task_id: TaskId, errors: Vec<Error>) {
        tracing::warn!(task = %task_id, causes = errors.len(), "fault dropped without observation");
        self.inner.reported_total.fetch_add(1, Ordering::Relaxed);
        self.inner.pending.lock().push(UnobservedFault { task_id, errors });
    }

    /// Drains pending reports, dispatching each to the handler or the
    /// escalation policy.
    ///
    /// Returns the number of reports drained. Each fault is delivered at
    /// most once across all sweeps.
    ///
    /// # Panics
    ///
    /// Panics when an unhandled fault meets [`EscalationPolicy::Escalate`].
    pub fn sweep(&self) -> usize {
        let drained = std::mem::take(&mut *self.inner.pending.lock());
        let count = drained.len();
        for fault in drained {
            // Clone the handler out so it runs without holding the lock.
            let handler = self.inner.handler.lock().clone();
            let handled = handler.is_some_and(|handler| (*handler)(&fault));
            if handled {
                tracing::debug!(task = %fault.task_id(), "unobserved fault handled");
                continue;
            }
            match self.policy() {
                EscalationPolicy::Escalate => {
                    tracing::error!(task = %fault.task_id(), "escalating unobserved fault");
                    panic!("unobserved task fault: {fault}");
                }
                EscalationPolicy::LogAndContinue => {
                    tracing::error!(task = %fault.task_id(), fault = %fault, "unobserved fault");
                }
            }
        }
        count
    }
}

impl fmt::Debug for FaultMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultMonitor")
            .field("pending", &self.pending_count())
            .field("reported_total", &self.reported_total())
            .field("policy", &self.policy())
            .finish()
    }
}
