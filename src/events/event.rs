//! # Runtime events emitted by scopes, tasks, and dispatchers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Runtime events**: blocking entry point started/stopped
//! - **Scope events**: structured boundaries opening, closing, recording failures
//! - **Task lifecycle events**: spawn, start, and the three terminal states
//! - **Dispatcher/subscriber events**: context switches and delivery problems
//!
//! The [`Event`] struct carries optional metadata such as the task name, the
//! owning scope's label, the dispatcher name, and a reason string.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use taskscope::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task("worker")
//!     .with_scope("root")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task.as_deref(), Some("worker"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Runtime events ===
    /// The blocking entry point started driving a root scope.
    ///
    /// Sets:
    /// - `scope`: root scope label
    /// - `dispatcher`: the dedicated blocking dispatcher
    RuntimeStarted,

    /// The root scope reached a terminal state and the entry point returned.
    ///
    /// Sets:
    /// - `scope`: root scope label
    /// - `reason`: outcome label (`completed`, `task_failed`, `task_cancelled`)
    RuntimeStopped,

    // === Scope events ===
    /// A structured boundary was entered.
    ///
    /// Sets:
    /// - `scope`: scope label
    ScopeOpened,

    /// A scope finished draining its children and produced its outcome.
    ///
    /// Sets:
    /// - `scope`: scope label
    /// - `reason`: outcome label
    ScopeClosed,

    /// A scope recorded its first failure and signalled cancellation to the
    /// rest of its children.
    ///
    /// Sets:
    /// - `scope`: scope label
    /// - `reason`: failure message
    FailureRecorded,

    // === Task lifecycle events ===
    /// A task was registered with its scope and handed to a dispatcher.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `scope`: owning scope label
    /// - `dispatcher`: assigned dispatcher name
    TaskSpawned,

    /// A task left Created and began running user code.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `scope`: owning scope label
    TaskStarting,

    /// A task's work function returned a value.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `scope`: owning scope label
    TaskCompleted,

    /// A task's work function failed (or panicked).
    ///
    /// Sets:
    /// - `task`: task name
    /// - `scope`: owning scope label
    /// - `reason`: failure message
    TaskFailed,

    /// A task observed cancellation and reached the Cancelled state.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `scope`: owning scope label
    TaskCancelled,

    // === Dispatcher events ===
    /// A task suspended to continue on another dispatcher.
    ///
    /// Sets:
    /// - `task`: task name (if the switch happens inside a task)
    /// - `dispatcher`: target dispatcher name
    DispatcherSwitched,

    /// A dispatcher switch finished and the task resumed on its original
    /// dispatcher, whether or not the switched body failed.
    ///
    /// Sets:
    /// - `task`: task name (if the switch happened inside a task)
    /// - `dispatcher`: original dispatcher name
    DispatcherRestored,

    // === Subscriber events ===
    /// A subscriber's queue was full and an event was dropped for it.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: reason string (`full`, `closed`)
    SubscriberOverflow,

    /// A subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the task or subscriber, if applicable.
    pub task: Option<Arc<str>>,
    /// Label of the scope, if applicable.
    pub scope: Option<Arc<str>>,
    /// Name of the dispatcher, if applicable.
    pub dispatcher: Option<Arc<str>>,
    /// Human-readable reason (errors, outcome labels, overflow details).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next global sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            scope: None,
            dispatcher: None,
            reason: None,
        }
    }

    /// Attaches a task (or subscriber) name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a scope label.
    #[inline]
    pub fn with_scope(mut self, scope: impl Into<Arc<str>>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Attaches a dispatcher name.
    #[inline]
    pub fn with_dispatcher(mut self, dispatcher: impl Into<Arc<str>>) -> Self {
        self.dispatcher = Some(dispatcher.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub(crate) fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub(crate) fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    /// Returns `true` for events reporting subscriber delivery problems.
    ///
    /// The fan-out machinery uses this to avoid publishing delivery problems
    /// about delivery-problem events.
    #[inline]
    pub fn is_delivery_report(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
