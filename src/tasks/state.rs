//! # Task state machine.
//!
//! Every task moves through [`TaskState`] exactly once:
//!
//! ```text
//! Created ──► Active ──► Completed   (work returned a value)
//!    │           │  ╲──► Failed      (work returned an error or panicked)
//!    │           ╲─────► Cancelled   (cancellation observed at a suspension point)
//!    ╰──────────────────► Cancelled  (cancelled before start)
//!
//! Active ◄──► Suspended              (around delay / join / dispatcher switch)
//! ```
//!
//! ## Rules
//! - Terminal states (Completed, Failed, Cancelled) are sticky: no transition
//!   ever leaves them.
//! - The failure slot is written at most once, exactly at the Failed
//!   transition.
//! - A task created inside an already-cancelled scope goes straight from
//!   Created to Cancelled and never enters Active.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Global id counter; task ids are unique per process.
static TASK_SEQ: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Registered with a scope, not yet running.
    Created = 0,
    /// Running user code on a dispatcher.
    Active = 1,
    /// Parked at a suspension point; the physical resource is released.
    Suspended = 2,
    /// Work returned a value.
    Completed = 3,
    /// Work returned an error or panicked.
    Failed = 4,
    /// Cancellation observed, or cancelled before start.
    Cancelled = 5,
}

impl TaskState {
    /// Returns `true` once the task can never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            TaskState::Created => "created",
            TaskState::Active => "active",
            TaskState::Suspended => "suspended",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    fn from_u8(raw: u8) -> TaskState {
        match raw {
            0 => TaskState::Created,
            1 => TaskState::Active,
            2 => TaskState::Suspended,
            3 => TaskState::Completed,
            4 => TaskState::Failed,
            _ => TaskState::Cancelled,
        }
    }
}

/// Whether a task was spawned fire-and-forget or with a joinable result.
///
/// Fire tasks report failures to their scope the moment they terminate;
/// awaitable tasks defer that until the scope closes, because an error that a
/// caller handles at the `join` site must not count against the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Fire,
    Awaitable,
}

/// Shared record backing a task handle.
///
/// Holds everything both sides need: the state machine, the task's own
/// cancellation token (a child of the scope token, so cancelling one task
/// never touches siblings), and the failure slot consulted by the owning
/// scope's aggregation.
pub(crate) struct TaskCell {
    id: u64,
    name: Arc<str>,
    kind: TaskKind,
    state: AtomicU8,
    token: CancellationToken,
    observed: AtomicBool,
    failure: Mutex<Option<TaskError>>,
}

impl TaskCell {
    pub(crate) fn new(name: Arc<str>, kind: TaskKind, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            id: TASK_SEQ.fetch_add(1, Ordering::Relaxed),
            name,
            kind,
            state: AtomicU8::new(TaskState::Created as u8),
            token,
            observed: AtomicBool::new(false),
            failure: Mutex::new(None),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub(crate) fn kind(&self) -> TaskKind {
        self.kind
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Attempts a state transition; terminal states are never left.
    ///
    /// Returns `true` if the transition happened.
    pub(crate) fn mark(&self, next: TaskState) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            if TaskState::from_u8(cur).is_terminal() {
                return false;
            }
            match self.state.compare_exchange(
                cur,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Records the failure and transitions to Failed.
    pub(crate) fn mark_failed(&self, err: &TaskError) -> bool {
        {
            let mut slot = self.failure.lock().expect("failure slot poisoned");
            if slot.is_none() {
                *slot = Some(err.clone());
            }
        }
        self.mark(TaskState::Failed)
    }

    pub(crate) fn failure(&self) -> Option<TaskError> {
        self.failure.lock().expect("failure slot poisoned").clone()
    }

    /// Marks the task's error as delivered to a `join` caller.
    pub(crate) fn mark_observed(&self) {
        self.observed.store(true, Ordering::Release);
    }

    pub(crate) fn is_observed(&self) -> bool {
        self.observed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: TaskKind) -> Arc<TaskCell> {
        TaskCell::new(Arc::from("t"), kind, CancellationToken::new())
    }

    #[test]
    fn test_happy_path_transitions() {
        let c = cell(TaskKind::Fire);
        assert_eq!(c.state(), TaskState::Created);
        assert!(c.mark(TaskState::Active));
        assert!(c.mark(TaskState::Suspended));
        assert!(c.mark(TaskState::Active));
        assert!(c.mark(TaskState::Completed));
        assert_eq!(c.state(), TaskState::Completed);
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let c = cell(TaskKind::Awaitable);
        assert!(c.mark(TaskState::Cancelled));
        assert!(!c.mark(TaskState::Active));
        assert!(!c.mark(TaskState::Completed));
        assert_eq!(c.state(), TaskState::Cancelled);
    }

    #[test]
    fn test_failure_slot_written_once() {
        let c = cell(TaskKind::Awaitable);
        c.mark(TaskState::Active);
        assert!(c.mark_failed(&TaskError::failed("first")));
        assert!(!c.mark_failed(&TaskError::failed("second")));
        match c.failure() {
            Some(TaskError::Failed { error }) => assert_eq!(error, "first"),
            other => panic!("unexpected failure slot: {other:?}"),
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let a = cell(TaskKind::Fire);
        let b = cell(TaskKind::Fire);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_labels() {
        assert_eq!(TaskState::Suspended.as_label(), "suspended");
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Suspended.is_terminal());
    }
}
