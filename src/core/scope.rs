//! # Scope: the structured-concurrency boundary.
//!
//! A [`Scope`] owns a set of child tasks and does not produce an outcome
//! until every one of them is terminal. Failures cancel the remaining
//! siblings; the first recorded failure is the one that surfaces.
//!
//! ## High-level flow
//! ```text
//! spawn / spawn_awaitable:
//!   child token = scope token.child_token()
//!   TaskCell::new ──► dispatcher.spawn(run_task(..)) ──► children.push
//!
//! close(body result):
//!   ├─► body Err(Failed)    ──► record_failure ──► token.cancel()
//!   ├─► body Err(Cancelled) ──► token.cancel()
//!   ├─► drain: join every child (including ones spawned while draining)
//!   ├─► sweep: Failed children whose error was never joined ──► record_failure
//!   └─► outcome: first failure ▸ cancelled ▸ body value
//! ```
//!
//! ## Rules
//! - The child set only grows; entries are removed by draining, never by the
//!   tasks themselves.
//! - `first_failure` is written once; later writers are discarded, not merged.
//! - Recording a failure immediately cancels the scope token, so unfinished
//!   siblings observe cancellation at their next suspension point.
//! - Spawning into a cancelled scope yields a task that goes straight to
//!   Cancelled; spawning into a closed scope does the same without ever
//!   reaching a dispatcher.

use std::borrow::Cow;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::runner;
use crate::dispatch::{Dispatcher, Dispatchers};
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Deferred, TaskCell, TaskContext, TaskHandle, TaskKind, TaskState};

/// Global scope id counter; used only for event labels.
static SCOPE_SEQ: AtomicU64 = AtomicU64::new(1);

/// A registered child: the shared cell plus the dispatcher-side join handle.
struct Child {
    cell: Arc<TaskCell>,
    join: JoinHandle<()>,
}

pub(crate) struct ScopeInner {
    label: Arc<str>,
    token: CancellationToken,
    dispatchers: Dispatchers,
    default_dispatcher: Arc<Dispatcher>,
    bus: Bus,
    children: Mutex<Vec<Child>>,
    first_failure: Mutex<Option<TaskError>>,
    closed: AtomicBool,
}

/// Cheap cloneable handle to a structured-concurrency boundary.
///
/// Obtained from [`TaskContext::scope`]; spawning through it registers
/// children that the boundary will wait for.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Root scope for a blocking entry point. Its token is fresh: nothing
    /// above it can cancel it except [`Scope::cancel`] itself.
    pub(crate) fn root(dispatchers: Dispatchers, bus: Bus) -> Self {
        Self::build(
            Cow::Borrowed("root"),
            CancellationToken::new(),
            dispatchers.main().clone(),
            dispatchers,
            bus,
        )
    }

    /// Nested scope for `with_scope`: token derives from the calling task so
    /// that cancelling the caller cancels the whole subtree.
    pub(crate) fn nested(&self, parent: &CancellationToken, dispatcher: Arc<Dispatcher>) -> Self {
        let label = format!("scope-{}", SCOPE_SEQ.fetch_add(1, Ordering::Relaxed));
        Self::build(
            Cow::Owned(label),
            parent.child_token(),
            dispatcher,
            self.inner.dispatchers.clone(),
            self.inner.bus.clone(),
        )
    }

    fn build(
        label: Cow<'static, str>,
        token: CancellationToken,
        default_dispatcher: Arc<Dispatcher>,
        dispatchers: Dispatchers,
        bus: Bus,
    ) -> Self {
        let label: Arc<str> = Arc::from(label.as_ref());
        bus.publish(Event::new(EventKind::ScopeOpened).with_scope(label.clone()));
        Self {
            inner: Arc::new(ScopeInner {
                label,
                token,
                dispatchers,
                default_dispatcher,
                bus,
                children: Mutex::new(Vec::new()),
                first_failure: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the scope's label (`root`, `scope-1`, ...).
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// The runtime's named dispatcher pair.
    pub fn dispatchers(&self) -> &Dispatchers {
        &self.inner.dispatchers
    }

    /// Returns `true` once the scope token (or an ancestor) is signalled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Requests cancellation of the scope and, transitively, of every present
    /// and future child. Idempotent.
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Spawns a fire-and-forget task on the scope's default dispatcher.
    ///
    /// Returns immediately: the work runs concurrently with the code after
    /// the call. An unhandled failure of the work function is recorded
    /// against the scope the moment the task terminates.
    pub fn spawn<F, Fut>(&self, name: impl Into<Cow<'static, str>>, work: F) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let dispatcher = self.inner.default_dispatcher.clone();
        self.spawn_on(&dispatcher, name, work)
    }

    /// Spawns a fire-and-forget task on an explicit dispatcher.
    pub fn spawn_on<F, Fut>(
        &self,
        dispatcher: &Arc<Dispatcher>,
        name: impl Into<Cow<'static, str>>,
        work: F,
    ) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let (cell, _rx) = self.register(dispatcher, name.into(), TaskKind::Fire, work);
        TaskHandle::new(cell)
    }

    /// Spawns an awaitable task on the scope's default dispatcher.
    ///
    /// The returned [`Deferred`] suspends its caller in
    /// [`join`](Deferred::join) until the child is terminal. An error handled
    /// at the join site stays there; one that is never delivered is recorded
    /// against the scope when it closes.
    pub fn spawn_awaitable<T, F, Fut>(
        &self,
        name: impl Into<Cow<'static, str>>,
        work: F,
    ) -> Deferred<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let dispatcher = self.inner.default_dispatcher.clone();
        self.spawn_awaitable_on(&dispatcher, name, work)
    }

    /// Spawns an awaitable task on an explicit dispatcher.
    pub fn spawn_awaitable_on<T, F, Fut>(
        &self,
        dispatcher: &Arc<Dispatcher>,
        name: impl Into<Cow<'static, str>>,
        work: F,
    ) -> Deferred<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let (cell, rx) = self.register(dispatcher, name.into(), TaskKind::Awaitable, work);
        Deferred::new(cell, rx)
    }

    /// Creates the cell, publishes the spawn event, and schedules the runner.
    fn register<T, F, Fut>(
        &self,
        dispatcher: &Arc<Dispatcher>,
        name: Cow<'static, str>,
        kind: TaskKind,
        work: F,
    ) -> (Arc<TaskCell>, oneshot::Receiver<Result<T, TaskError>>)
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let name: Arc<str> = Arc::from(name.as_ref());
        let cell = TaskCell::new(name.clone(), kind, self.inner.token.child_token());
        let (tx, rx) = oneshot::channel();

        self.inner.bus.publish(
            Event::new(EventKind::TaskSpawned)
                .with_task(name)
                .with_scope(self.inner.label.clone())
                .with_dispatcher(dispatcher.name().to_string()),
        );

        if self.inner.closed.load(Ordering::Acquire) {
            // The boundary already produced its outcome; nobody will drain
            // this task, so it never reaches a dispatcher.
            cell.mark(TaskState::Cancelled);
            self.inner.bus.publish(
                Event::new(EventKind::TaskCancelled)
                    .with_task(cell.name().clone())
                    .with_scope(self.inner.label.clone())
                    .with_reason("scope already closed"),
            );
            let _ = tx.send(Err(TaskError::Cancelled));
            return (cell, rx);
        }

        let join = dispatcher.spawn(runner::run_task(
            self.clone(),
            dispatcher.clone(),
            cell.clone(),
            work,
            tx,
        ));
        self.inner.children.lock().expect("children lock poisoned").push(Child {
            cell: cell.clone(),
            join,
        });
        (cell, rx)
    }

    /// Records the scope's first failure and signals cancellation to the
    /// remaining children. Later failures are discarded.
    pub(crate) fn record_failure(&self, err: &TaskError) {
        {
            let mut slot = self
                .inner
                .first_failure
                .lock()
                .expect("failure slot poisoned");
            if slot.is_some() {
                return;
            }
            *slot = Some(err.clone());
        }
        self.inner.bus.publish(
            Event::new(EventKind::FailureRecorded)
                .with_scope(self.inner.label.clone())
                .with_reason(err.to_string()),
        );
        self.inner.token.cancel();
    }

    /// Drives the boundary to its aggregate outcome.
    ///
    /// Order matters: the body's own result is folded in first (a failing
    /// body cancels its children), then every child is drained, then failures
    /// that were never delivered to a `join` caller are swept into the
    /// aggregation.
    pub(crate) async fn close<T>(&self, body: Result<T, TaskError>) -> Result<T, TaskError> {
        match &body {
            Err(err) if err.is_failure() => self.record_failure(err),
            Err(_) => self.inner.token.cancel(),
            Ok(_) => {}
        }

        let drained = self.drain().await;
        for cell in &drained {
            if cell.state() == TaskState::Failed && !cell.is_observed() {
                if let Some(err) = cell.failure() {
                    self.record_failure(&err);
                }
            }
        }

        let first = self
            .inner
            .first_failure
            .lock()
            .expect("failure slot poisoned")
            .clone();
        let outcome = match first {
            Some(err) => Err(err),
            None if self.inner.token.is_cancelled() => Err(TaskError::Cancelled),
            None => body,
        };

        let label = match &outcome {
            Ok(_) => "completed",
            Err(err) => err.as_label(),
        };
        self.inner.bus.publish(
            Event::new(EventKind::ScopeClosed)
                .with_scope(self.inner.label.clone())
                .with_reason(label),
        );
        outcome
    }

    /// Joins every child, including ones spawned while draining, then marks
    /// the scope closed.
    async fn drain(&self) -> Vec<Arc<TaskCell>> {
        let mut drained = Vec::new();
        loop {
            let next = self
                .inner
                .children
                .lock()
                .expect("children lock poisoned")
                .pop();
            match next {
                Some(child) => {
                    // Runner futures never panic (work is caught inside); a
                    // join error here means the runtime is tearing down.
                    let _ = child.join.await;
                    drained.push(child.cell);
                }
                None => break,
            }
        }
        self.inner.closed.store(true, Ordering::Release);
        drained
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("label", &self.label())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
