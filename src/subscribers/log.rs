//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format. This is
//! primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [spawned] task=worker scope=root dispatcher=pool
//! [starting] task=worker scope=root
//! [failed] task=worker scope=root reason="task failed: boom"
//! [failure-recorded] scope=root reason="task failed: boom"
//! [cancelled] task=sibling scope=root
//! [scope-closed] scope=root outcome=task_failed
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::subscriber::Subscribe;

/// Stdout logging subscriber, enabled via the `logging` feature.
///
/// Not intended for production use; implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
#[derive(Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Creates a new stdout logger.
    pub fn new() -> Self {
        LogWriter
    }
}

fn opt(field: &Option<std::sync::Arc<str>>) -> &str {
    field.as_deref().unwrap_or("-")
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::RuntimeStarted => {
                println!("[runtime-started] dispatcher={}", opt(&e.dispatcher));
            }
            EventKind::RuntimeStopped => {
                println!("[runtime-stopped] outcome={}", opt(&e.reason));
            }
            EventKind::ScopeOpened => {
                println!("[scope-opened] scope={}", opt(&e.scope));
            }
            EventKind::ScopeClosed => {
                println!("[scope-closed] scope={} outcome={}", opt(&e.scope), opt(&e.reason));
            }
            EventKind::FailureRecorded => {
                println!(
                    "[failure-recorded] scope={} reason={:?}",
                    opt(&e.scope),
                    opt(&e.reason)
                );
            }
            EventKind::TaskSpawned => {
                println!(
                    "[spawned] task={} scope={} dispatcher={}",
                    opt(&e.task),
                    opt(&e.scope),
                    opt(&e.dispatcher)
                );
            }
            EventKind::TaskStarting => {
                println!("[starting] task={} scope={}", opt(&e.task), opt(&e.scope));
            }
            EventKind::TaskCompleted => {
                println!("[completed] task={} scope={}", opt(&e.task), opt(&e.scope));
            }
            EventKind::TaskFailed => {
                println!(
                    "[failed] task={} scope={} reason={:?}",
                    opt(&e.task),
                    opt(&e.scope),
                    opt(&e.reason)
                );
            }
            EventKind::TaskCancelled => {
                println!("[cancelled] task={} scope={}", opt(&e.task), opt(&e.scope));
            }
            EventKind::DispatcherSwitched => {
                println!("[switch] task={} to={}", opt(&e.task), opt(&e.dispatcher));
            }
            EventKind::DispatcherRestored => {
                println!("[resume] task={} on={}", opt(&e.task), opt(&e.dispatcher));
            }
            EventKind::SubscriberOverflow => {
                println!(
                    "[subscriber-overflow] subscriber={} reason={}",
                    opt(&e.task),
                    opt(&e.reason)
                );
            }
            EventKind::SubscriberPanicked => {
                println!(
                    "[subscriber-panicked] subscriber={} reason={:?}",
                    opt(&e.task),
                    opt(&e.reason)
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
