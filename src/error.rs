//! Error types used by the visibility runtime and supervised processes.
//!
//! This module defines three error enums:
//!
//! - [`FatalError`]: programmer errors. Raising APIs panic with their message,
//!   non-raising `try_*` variants hand them back.
//! - [`ProcessError`]: errors returned by process bodies.
//! - [`RuntimeError`]: errors raised by the supervisor itself.
//!
//! All types provide `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

use crate::metrics::Unit;

/// # Programmer errors.
///
/// These are never retried and are meant to surface during development:
/// the raising APIs (`Scope::logger`, `MetricAccumulator::add_metric`,
/// `ProcessContext::run`) panic with the error's message.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FatalError {
    /// A logger was fetched from a scope that was never primed with one.
    #[error("trying to log from an un-imbued scope")]
    UnprimedLogger,

    /// A metric accumulator was fetched from a scope that carries none.
    #[error("no metrics accumulator attached to the scope")]
    UnprimedMetrics,

    /// A metric was added with a unit different from the one it was created with.
    #[error("inconsistent unit assignment for {name:?}, was {was} want {want}")]
    UnitMismatch {
        /// Metric name.
        name: String,
        /// Unit fixed by the first assignment.
        was: Unit,
        /// Unit of the rejected assignment.
        want: Unit,
    },

    /// A process with the same name is still running.
    #[error("there's already a process named: {name}")]
    DuplicateProcess {
        /// The contested process name.
        name: String,
    },

    /// A process context whose run already finished was started again.
    #[error("process context {name:?} already ran, create a new one to run it again")]
    ContextReused {
        /// The process name.
        name: String,
    },

    /// The supervisor owning a process context was dropped.
    #[error("supervisor for process {name:?} is gone")]
    SupervisorGone {
        /// The process name.
        name: String,
    },
}

impl FatalError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use visibility::FatalError;
    ///
    /// let err = FatalError::DuplicateProcess { name: "poller".into() };
    /// assert_eq!(err.as_label(), "fatal_duplicate_process");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            FatalError::UnprimedLogger => "fatal_unprimed_logger",
            FatalError::UnprimedMetrics => "fatal_unprimed_metrics",
            FatalError::UnitMismatch { .. } => "fatal_unit_mismatch",
            FatalError::DuplicateProcess { .. } => "fatal_duplicate_process",
            FatalError::ContextReused { .. } => "fatal_context_reused",
            FatalError::SupervisorGone { .. } => "fatal_supervisor_gone",
        }
    }

    /// Raises the error as a panic.
    pub(crate) fn raise(self) -> ! {
        panic!("{self}")
    }
}

/// # Errors returned by process bodies.
///
/// A process error is recoverable: the supervisor logs it and, for periodic
/// processes, keeps looping.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The body failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The body observed cancellation of its scope and gave up.
    #[error("context cancelled")]
    Canceled,
}

impl ProcessError {
    /// Builds a [`ProcessError::Fail`] from anything printable.
    pub fn fail(error: impl std::fmt::Display) -> Self {
        ProcessError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use visibility::ProcessError;
    ///
    /// assert_eq!(ProcessError::fail("boom").as_label(), "process_failed");
    /// assert_eq!(ProcessError::Canceled.as_label(), "process_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::Fail { .. } => "process_failed",
            ProcessError::Canceled => "process_canceled",
        }
    }

    /// Returns true when the error only reports cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ProcessError::Canceled)
    }
}

impl From<String> for ProcessError {
    fn from(error: String) -> Self {
        ProcessError::Fail { error }
    }
}

impl From<&str> for ProcessError {
    fn from(error: &str) -> Self {
        ProcessError::Fail {
            error: error.to_string(),
        }
    }
}

/// # Errors produced by the supervisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Drain did not finish within the grace period.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of processes still registered when the grace ran out.
        stuck: Vec<String>,
    },

    /// Waiting for an OS shutdown signal failed.
    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_mismatch_message_names_both_units() {
        let err = FatalError::UnitMismatch {
            name: "x".into(),
            was: Unit::Bytes,
            want: Unit::Count,
        };
        assert_eq!(
            err.to_string(),
            "inconsistent unit assignment for \"x\", was Bytes want Count"
        );
    }

    #[test]
    fn process_error_conversions() {
        let e: ProcessError = "nope".into();
        assert_eq!(e.to_string(), "execution failed: nope");
        assert!(!e.is_canceled());
        assert!(ProcessError::Canceled.is_canceled());
    }

    #[test]
    fn grace_exceeded_lists_stuck() {
        let err = RuntimeError::GraceExceeded {
            grace: Duration::from_secs(1),
            stuck: vec!["a".into()],
        };
        assert_eq!(err.as_label(), "runtime_grace_exceeded");
        assert!(err.to_string().contains("[\"a\"]"));
    }
}
