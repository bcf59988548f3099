//! # Run a single task through its state machine.
//!
//! [`run_task`] is the future a dispatcher executes for every spawned task.
//! It owns the transitions, publishes lifecycle events to the bus, and writes
//! the result slot exactly once.
//!
//! ## Flow
//! ```text
//! token already cancelled ──► Cancelled (never Active), slot = Err(Cancelled)
//! otherwise:
//!   Active ──► work(ctx).await
//!     Ok(v)           ──► Completed, slot = Ok(v)
//!     Err(Cancelled)  ──► Cancelled, slot = Err(Cancelled)
//!     Err(Failed)     ──► Failed, slot = Err(e)
//!     panic           ──► Failed (converted), slot = Err(e)
//! ```
//!
//! ## Rules
//! - Exactly one terminal event is published per task: `TaskCompleted`,
//!   `TaskFailed`, or `TaskCancelled`.
//! - A fire-and-forget failure is reported to the owning scope here, the
//!   moment it happens; awaitable failures wait for the join site or the
//!   scope's closing sweep.
//! - Panics in work functions are caught and converted to failures; the
//!   scheduler never sees an unwinding task.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;

use crate::core::scope::Scope;
use crate::dispatch::Dispatcher;
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::tasks::{TaskCell, TaskContext, TaskKind, TaskState};

/// Drives one task from Created to a terminal state.
pub(crate) async fn run_task<T, F, Fut>(
    scope: Scope,
    dispatcher: Arc<Dispatcher>,
    cell: Arc<TaskCell>,
    work: F,
    tx: tokio::sync::oneshot::Sender<Result<T, TaskError>>,
) where
    T: Send + 'static,
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
{
    if cell.token().is_cancelled() {
        cell.mark(TaskState::Cancelled);
        publish_terminal(&scope, &cell, EventKind::TaskCancelled, None);
        let _ = tx.send(Err(TaskError::Cancelled));
        return;
    }

    cell.mark(TaskState::Active);
    scope.bus().publish(
        Event::new(EventKind::TaskStarting)
            .with_task(cell.name().clone())
            .with_scope(scope.label().to_string()),
    );

    let ctx = TaskContext::for_task(&scope, dispatcher, cell.clone());
    let outcome = match std::panic::AssertUnwindSafe(work(ctx)).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => Err(TaskError::from_panic(payload)),
    };

    let outcome = match outcome {
        Ok(value) => {
            cell.mark(TaskState::Completed);
            publish_terminal(&scope, &cell, EventKind::TaskCompleted, None);
            Ok(value)
        }
        Err(err) if err.is_cancellation() => {
            cell.mark(TaskState::Cancelled);
            publish_terminal(&scope, &cell, EventKind::TaskCancelled, None);
            Err(err)
        }
        Err(err) => {
            cell.mark_failed(&err);
            publish_terminal(&scope, &cell, EventKind::TaskFailed, Some(err.to_string()));
            if cell.kind() == TaskKind::Fire {
                // Nobody can join a fire-and-forget task: escalate now so the
                // scope cancels the remaining siblings.
                scope.record_failure(&err);
            }
            Err(err)
        }
    };

    // The receiver may be gone (fire-and-forget, or a dropped Deferred); the
    // scope's closing sweep still sees the cell.
    let _ = tx.send(outcome);
}

fn publish_terminal(scope: &Scope, cell: &TaskCell, kind: EventKind, reason: Option<String>) {
    let mut ev = Event::new(kind)
        .with_task(cell.name().clone())
        .with_scope(scope.label().to_string());
    if let Some(reason) = reason {
        ev = ev.with_reason(reason);
    }
    scope.bus().publish(ev);
}
