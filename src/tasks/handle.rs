//! # Task handles: fire-and-forget and awaitable.
//!
//! [`Scope::spawn`](crate::Scope::spawn) returns a [`TaskHandle`];
//! [`Scope::spawn_awaitable`](crate::Scope::spawn_awaitable) returns a
//! [`Deferred`], which adds a suspending [`join`](Deferred::join) on top of
//! the handle surface.
//!
//! ## Rules
//! - `cancel` signals only the task's own token (a child of the scope token),
//!   so siblings are unaffected. It is idempotent; on a terminal task it is a
//!   no-op.
//! - `join` is a suspension point: it checks the calling task's token before
//!   and after the wait and resolves to `Err(TaskError::Cancelled)` when the
//!   caller itself is cancelled.
//! - The result slot is written exactly once; `join` consumes the handle and
//!   returns the value unchanged (identity-preserving).
//! - An error delivered by `join` counts as observed: it will not be swept
//!   into the scope's aggregation a second time.

use std::sync::Arc;

use tokio::select;
use tokio::sync::oneshot;

use crate::error::TaskError;
use crate::tasks::context::TaskContext;
use crate::tasks::state::{TaskCell, TaskState};

/// Handle to a fire-and-forget task.
///
/// ## Example
/// ```no_run
/// use taskscope::run_blocking;
///
/// run_blocking(|ctx| async move {
///     let handle = ctx.scope().spawn("ticker", |c| async move {
///         loop {
///             c.delay(std::time::Duration::from_millis(100)).await?;
///         }
///     });
///     ctx.delay(std::time::Duration::from_millis(250)).await?;
///     handle.cancel();
///     Ok(())
/// })
/// .unwrap();
/// ```
#[derive(Clone)]
pub struct TaskHandle {
    cell: Arc<TaskCell>,
}

impl TaskHandle {
    pub(crate) fn new(cell: Arc<TaskCell>) -> Self {
        Self { cell }
    }

    /// Returns the task's unique id.
    pub fn id(&self) -> u64 {
        self.cell.id()
    }

    /// Returns the task's name.
    pub fn name(&self) -> &str {
        self.cell.name()
    }

    /// Returns the task's current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.cell.state()
    }

    /// Returns `true` once the task reached Completed, Failed, or Cancelled.
    pub fn is_terminal(&self) -> bool {
        self.cell.state().is_terminal()
    }

    /// Requests cooperative cancellation of this task only.
    ///
    /// Signals the task's own token; the task transitions to Cancelled at its
    /// next suspension point. Idempotent, and a no-op on terminal tasks.
    pub fn cancel(&self) {
        if !self.is_terminal() {
            self.cell.token().cancel();
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Handle to an awaitable task: a result that will eventually hold a value,
/// an error, or a cancellation marker.
pub struct Deferred<T> {
    handle: TaskHandle,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> Deferred<T> {
    pub(crate) fn new(cell: Arc<TaskCell>, rx: oneshot::Receiver<Result<T, TaskError>>) -> Self {
        Self {
            handle: TaskHandle::new(cell),
            rx,
        }
    }

    /// Returns the task's unique id.
    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    /// Returns the task's name.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Returns the task's current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.handle.state()
    }

    /// Requests cooperative cancellation of this task only.
    ///
    /// The sibling tasks of the same scope are unaffected; a subsequent
    /// [`join`](Deferred::join) resolves to `Err(TaskError::Cancelled)`.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Suspends the calling task until this task is terminal, then returns
    /// its value, its recorded error, or `Err(TaskError::Cancelled)` if it
    /// was cancelled.
    ///
    /// Cancellation of the *caller* is honored before and after the wait: a
    /// cancelled caller gets `Err(TaskError::Cancelled)` without consuming
    /// the child's outcome, and the child's failure (if any) is then surfaced
    /// by the owning scope instead of being lost.
    pub async fn join(mut self, ctx: &TaskContext) -> Result<T, TaskError> {
        if ctx.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        ctx.mark_suspended();
        let waited = select! {
            res = &mut self.rx => Some(res),
            () = ctx.token().cancelled() => None,
        };
        ctx.mark_active();
        if ctx.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        match waited {
            Some(Ok(out)) => {
                if matches!(out, Err(ref e) if e.is_failure()) {
                    self.handle.cell.mark_observed();
                }
                out
            }
            // The runner always sends before exiting; a closed channel means
            // the backing runtime is tearing down mid-flight.
            Some(Err(_closed)) => Err(TaskError::Cancelled),
            None => Err(TaskError::Cancelled),
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
