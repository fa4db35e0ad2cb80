//! Promissory: single-assignment tasks with explicit continuation scheduling.
//!
//! # Overview
//!
//! A [`Task`] is a handle to a unit of deferred work that will eventually
//! produce a value or fault with one or more errors. Tasks are completed
//! exactly once, by exactly one writer: either a worker thread running the
//! unit of work, or a [`CompletionSource`] driven by external code. Once a
//! task reaches a terminal state, its payload is immutable and safe to read
//! from any number of threads.
//!
//! # Core Guarantees
//!
//! - **One-way state**: `Pending` transitions once into `RanToCompletion`,
//!   `Faulted`, or `Canceled`, and never changes again
//! - **Exactly-once continuations**: every registered continuation fires
//!   exactly once, whether registered before or after completion, and never
//!   inline in the registering caller
//! - **Captured faults**: a failing or panicking unit of work never unwinds
//!   into the scheduler; its errors surface only when an observer reads them,
//!   wrapped in an [`AggregateFault`] that is stable across repeated reads
//! - **No silent drops**: a faulted task whose errors were never read reports
//!   itself to its scheduler's [`FaultMonitor`] when the last handle to it is
//!   released
//!
//! # Module Structure
//!
//! - [`task`]: the task handle, its state machine, and completion sources
//! - [`scheduler`]: worker pool, configuration, and continuation dispatch
//! - [`combinator`]: operations composing several tasks into one
//! - [`monitor`]: unobserved-fault tracking and escalation
//! - [`error`]: error types
//! - [`types`]: identifier types
//!
//! # Example
//!
//! ```
//! use promissory::{ContinuationFilter, Scheduler};
//!
//! let scheduler = Scheduler::builder().worker_threads(1, 2).build().unwrap();
//! let task = scheduler.run(|| Ok(21));
//! let doubled = task.continue_with_filter(
//!     |t: promissory::Task<i32>| t.value().map(|v| v * 2).map_err(Into::into),
//!     ContinuationFilter::OnlyOnSuccess,
//! );
//! assert_eq!(doubled.value().unwrap(), 42);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod combinator;
pub mod error;
pub mod monitor;
pub mod scheduler;
pub mod task;
pub mod test_utils;
pub mod types;

pub use combinator::{continue_when_all, when_all};
pub use error::{AggregateFault, Error, ErrorKind, Result};
pub use monitor::{EscalationPolicy, FaultMonitor, UnobservedFault};
pub use scheduler::{Scheduler, SchedulerBuilder, SchedulerConfig, SchedulerHandle};
pub use task::{CompletionSource, ContinuationFilter, Task, TaskStatus};
pub use types::{ContinuationId, TaskId};
