//! Error types and error handling strategy.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - A fault captured by a task never unwinds into the scheduler; it is
//!   re-raised only when an observer reads the task
//! - Faults surfacing from combinators are always re-aggregated, never
//!   re-thrown bare
//! - Contract violations (completing a completion source twice) are
//!   distinguished from runtime conditions by their kind
//!
//! The reading side of the crate speaks [`AggregateFault`]: observers of a
//! faulted task receive every underlying cause in its original order, and
//! repeated reads yield the same sequence.

use core::fmt;
use smallvec::SmallVec;
use std::sync::Arc;

/// The error sequence carried by a faulted task.
///
/// A directly-run unit of work contributes exactly one entry; combinators
/// may concatenate several.
pub(crate) type ErrorSeq = SmallVec<[Error; 1]>;

/// A specialized result type for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A unit of work returned an error while running.
    Work,
    /// A unit of work or continuation panicked; the payload was captured.
    Panic,
    /// A canceled task was asked for its value.
    Canceled,
    /// A completion source was resolved more than once, or resolved with an
    /// empty error sequence. This is a programming-contract violation, not a
    /// runtime condition.
    InvalidState,
    /// Scheduler configuration was rejected at build time.
    Config,
    /// Internal invariant violation (a bug in this crate).
    Internal,
}

impl ErrorKind {
    /// Returns true if this kind marks a programming-contract violation
    /// rather than a runtime condition.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(self, Self::InvalidState | Self::Internal)
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Work => "unit of work failed",
            Self::Panic => "panicked",
            Self::Canceled => "canceled",
            Self::InvalidState => "invalid state",
            Self::Config => "invalid configuration",
            Self::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for task operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Creates a work error with the given description.
    #[must_use]
    pub fn work(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Work).with_message(msg)
    }

    /// Creates an invalid-state error with the given description.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState).with_message(msg)
    }

    /// Creates a configuration error with the given description.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config).with_message(msg)
    }

    /// Converts a captured panic payload into a panic-kind error.
    ///
    /// `&str` and `String` payloads keep their message; anything else is
    /// recorded as opaque.
    #[must_use]
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "opaque panic payload".to_string());
        Self::new(ErrorKind::Panic).with_message(message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        if let Some(source) = &self.source {
            write!(f, " (caused by: {source})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// The fault surfaced to an observer reading a faulted task.
///
/// Wraps one or more underlying errors in their original order. Combinators
/// concatenate the error sequences of their faulted inputs, so an aggregate
/// read from a combined task carries one entry per underlying cause, and a
/// continuation that faulted because its antecedent faulted nests the
/// antecedent's aggregate behind its own entry's source chain.
///
/// Reading a faulted task twice yields equal aggregates: the underlying
/// sequence is immutable once the task is terminal.
#[derive(Debug, Clone)]
pub struct AggregateFault {
    errors: ErrorSeq,
}

impl AggregateFault {
    /// Wraps the given non-empty error sequence.
    pub(crate) fn new(errors: ErrorSeq) -> Self {
        debug_assert!(!errors.is_empty(), "aggregate fault with no causes");
        Self { errors }
    }

    pub(crate) fn single(error: Error) -> Self {
        Self::new(smallvec::smallvec![error])
    }

    /// Returns the underlying errors in their original order.
    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Returns the number of underlying errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns true if the aggregate wraps no errors.
    ///
    /// Never true for aggregates produced by this crate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consumes the aggregate, returning the underlying errors.
    #[must_use]
    pub fn into_errors(self) -> Vec<Error> {
        self.errors.into_vec()
    }
}

impl fmt::Display for AggregateFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aggregate fault ({} cause(s))", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            write!(f, "; [{i}] {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFault {}

impl From<AggregateFault> for Error {
    /// Collapses an aggregate into a single error, keeping the aggregate as
    /// the source so nested causes stay reachable through the chain.
    fn from(fault: AggregateFault) -> Self {
        Self::new(ErrorKind::Work)
            .with_message("antecedent task faulted")
            .with_source(fault)
    }
}
