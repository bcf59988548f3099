//! Error types used by the taskscope runtime and tasks.
//!
//! This module defines two main error enums:
//!
//! - [`TaskError`] — the tagged outcome of a unit of work: a recorded failure
//!   or an observed cancellation. Work functions return it, `join` returns it,
//!   and scope aggregation propagates it.
//! - [`RuntimeError`] — errors raised by the runtime itself, such as a
//!   dispatcher whose backing thread pool could not be built.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for
//! logging/metrics.
//!
//! ## Rules
//! - A failure and a cancellation are distinct variants and are never merged:
//!   code that handles one must decide explicitly about the other.
//! - `TaskError` is `Clone` so the first recorded failure of a scope can be
//!   both stored and re-surfaced at the boundary.

use std::io;

use thiserror::Error;

/// # Outcome errors of task execution.
///
/// Work functions return `Result<T, TaskError>`; every awaitable operation in
/// the crate (`delay`, `join`, `with_scope`, `with_context`) resolves to the
/// same type so that propagation is explicit at each call site.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// The work function failed with an application error.
    #[error("task failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The task observed cancellation at a suspension point, or was cancelled
    /// before it started.
    #[error("task cancelled")]
    Cancelled,
}

impl TaskError {
    /// Creates a failure from any displayable error.
    ///
    /// # Example
    /// ```
    /// use taskscope::TaskError;
    ///
    /// let err = TaskError::failed("connection refused");
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn failed(error: impl Into<String>) -> Self {
        TaskError::Failed {
            error: error.into(),
        }
    }

    /// Converts a caught panic payload into a failure.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        TaskError::Failed {
            error: format!("panicked: {}", panic_message(payload.as_ref())),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Failed { .. } => "task_failed",
            TaskError::Cancelled => "task_cancelled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Failed { error } => format!("error: {error}"),
            TaskError::Cancelled => "cancelled".to_string(),
        }
    }

    /// Returns `true` for [`TaskError::Cancelled`].
    ///
    /// Callers aggregating scope outcomes use this to keep cancellation
    /// signals out of the failure slot.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    /// Returns `true` for [`TaskError::Failed`].
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskError::Failed { .. })
    }
}

/// # Errors produced by the taskscope runtime.
///
/// These represent failures in the coordination machinery itself, plus the
/// aggregate task outcome when using the [`run_blocking`](crate::run_blocking)
/// convenience entry point.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A dispatcher's backing runtime could not be built.
    #[error("failed to build dispatcher {dispatcher:?}: {source}")]
    Build {
        /// Name of the dispatcher that failed to build.
        dispatcher: String,
        /// The underlying I/O error from the runtime builder.
        source: io::Error,
    },

    /// The root scope terminated with a failure or cancellation.
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Build { .. } => "runtime_build",
            RuntimeError::Task(e) => e.as_label(),
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::Build { dispatcher, source } => {
                format!("dispatcher {dispatcher:?} build failed: {source}")
            }
            RuntimeError::Task(e) => e.as_message(),
        }
    }
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
