//! Identifier types for tasks and continuations.

mod id;

pub use id::{ContinuationId, TaskId};
