//! # Task context: the capability handed to every work function.
//!
//! A [`TaskContext`] carries what a unit of work needs at its suspension
//! points: its own cancellation token, the owning [`Scope`], and the
//! dispatcher it is currently assigned to. Work closures receive it as their
//! only argument:
//!
//! ```no_run
//! use std::time::Duration;
//! use taskscope::run_blocking;
//!
//! run_blocking(|ctx| async move {
//!     ctx.scope().spawn("worker", |c| async move {
//!         c.delay(Duration::from_millis(10)).await?;
//!         Ok(())
//!     });
//!     Ok(())
//! })
//! .unwrap();
//! ```
//!
//! ## Suspension points
//! [`delay`](TaskContext::delay), [`Deferred::join`](crate::Deferred::join),
//! [`with_scope`](TaskContext::with_scope), and
//! [`with_context`](TaskContext::with_context) are the defined suspension
//! points. Each checks the task's token before and after waiting and resolves
//! to `Err(TaskError::Cancelled)` when the signal is set, without running
//! further user code in the task.
//!
//! ## Rules
//! - Cancellation is cooperative: code that never suspends is never
//!   interrupted.
//! - A dispatcher switch is transparent to cancellation: a pending signal is
//!   neither cleared nor masked by hopping runtimes.

use std::future::Future;
use std::sync::Arc;

use tokio::select;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::core::scope::Scope;
use crate::dispatch::{Dispatcher, Dispatchers};
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::tasks::state::{TaskCell, TaskState};

/// Execution context of a running task or scope body.
///
/// Cheap to clone; clones share the same token and scope.
#[derive(Clone)]
pub struct TaskContext {
    scope: Scope,
    dispatcher: Arc<Dispatcher>,
    token: CancellationToken,
    // None for scope bodies, which have no task cell of their own.
    cell: Option<Arc<TaskCell>>,
}

impl TaskContext {
    /// Context for a scope body: shares the scope's token, has no cell.
    pub(crate) fn for_body(scope: &Scope, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            token: scope.token().clone(),
            scope: scope.clone(),
            dispatcher,
            cell: None,
        }
    }

    /// Context for a spawned task: bound to the task's own token and cell.
    pub(crate) fn for_task(scope: &Scope, dispatcher: Arc<Dispatcher>, cell: Arc<TaskCell>) -> Self {
        Self {
            token: cell.token().clone(),
            scope: scope.clone(),
            dispatcher,
            cell: Some(cell),
        }
    }

    /// The scope owning the current task (or the scope itself, in a body).
    ///
    /// Spawning through it registers children with that scope.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The dispatcher currently executing this context.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The runtime's named dispatcher pair.
    pub fn dispatchers(&self) -> &Dispatchers {
        self.scope.dispatchers()
    }

    /// The cancellation token governing this context.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns `true` once this context (or any ancestor) is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn mark_suspended(&self) {
        if let Some(cell) = &self.cell {
            cell.mark(TaskState::Suspended);
        }
    }

    pub(crate) fn mark_active(&self) {
        if let Some(cell) = &self.cell {
            cell.mark(TaskState::Active);
        }
    }

    fn task_label(&self) -> Option<Arc<str>> {
        self.cell.as_ref().map(|c| c.name().clone())
    }

    /// Timed wait; the task's suspension point for the timer service.
    ///
    /// Checks cancellation before the wait, aborts the sleep the moment the
    /// token fires, and checks once more afterwards.
    pub async fn delay(&self, duration: std::time::Duration) -> Result<(), TaskError> {
        if self.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        self.mark_suspended();
        let sleep = time::sleep(duration);
        tokio::pin!(sleep);
        let out = select! {
            () = &mut sleep => Ok(()),
            () = self.token.cancelled() => Err(TaskError::Cancelled),
        };
        self.mark_active();
        if self.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        out
    }

    /// Nested structured boundary: runs `body` against a fresh child scope on
    /// the caller's execution resource, then suspends until every task the
    /// nested scope spawned is terminal.
    ///
    /// The nested scope's token derives from this context's token, so parent
    /// cancellation reaches the whole subtree. The aggregate outcome follows
    /// the scope rules: the first recorded failure wins, else cancellation,
    /// else the body's value.
    pub async fn with_scope<T, F, Fut>(&self, body: F) -> Result<T, TaskError>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
    {
        if self.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        let scope = self.scope.nested(&self.token, self.dispatcher.clone());
        let ctx = TaskContext::for_body(&scope, self.dispatcher.clone());
        let body_out = body(ctx).await;
        scope.close(body_out).await
    }

    /// Executes `body` on another dispatcher, then resumes on the original
    /// one.
    ///
    /// The calling task suspends; its continuation runs on `dispatcher`; once
    /// the body is terminal the caller resumes where it was. Restoration is
    /// unconditional: a failing body still resumes the original dispatcher
    /// before the error propagates. A pending cancellation is never masked by
    /// the switch; the token is checked on both edges.
    pub async fn with_context<T, F, Fut>(
        &self,
        dispatcher: &Arc<Dispatcher>,
        body: F,
    ) -> Result<T, TaskError>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        if self.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        let bus = self.scope.bus();
        let mut ev = Event::new(EventKind::DispatcherSwitched).with_dispatcher(dispatcher.name().to_string());
        if let Some(task) = self.task_label() {
            ev = ev.with_task(task);
        }
        bus.publish(ev);

        let inner = TaskContext {
            scope: self.scope.clone(),
            dispatcher: dispatcher.clone(),
            token: self.token.clone(),
            cell: self.cell.clone(),
        };
        let fut = body(inner);
        self.mark_suspended();
        let joined = dispatcher.spawn(fut).await;
        self.mark_active();

        let mut ev = Event::new(EventKind::DispatcherRestored)
            .with_dispatcher(self.dispatcher.name().to_string());
        if let Some(task) = self.task_label() {
            ev = ev.with_task(task);
        }
        bus.publish(ev);

        let out = match joined {
            Ok(res) => res,
            Err(join_err) => {
                if join_err.is_panic() {
                    Err(TaskError::from_panic(join_err.into_panic()))
                } else {
                    Err(TaskError::Cancelled)
                }
            }
        };
        if self.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        out
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("scope", &self.scope.label())
            .field("dispatcher", &self.dispatcher.name())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
