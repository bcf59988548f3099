//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for plugging custom event handlers
//! into the runtime (logging, metrics, assertions in tests).
//!
//! Each subscriber gets:
//! - a **dedicated worker task** on the pool dispatcher,
//! - a **per-subscriber bounded queue** (capacity via
//!   [`Subscribe::queue_capacity`]),
//! - **panic isolation**: a panicking handler is caught and reported as
//!   [`EventKind::SubscriberPanicked`](crate::EventKind::SubscriberPanicked).
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the event for this subscriber only and publishes
//!   [`EventKind::SubscriberOverflow`](crate::EventKind::SubscriberOverflow);
//!   other subscribers are unaffected.
//! - Events are processed sequentially (FIFO) per subscriber.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use taskscope::{Event, EventKind, Subscribe};
//!
//! struct FailureCounter;
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::TaskFailed) {
//!             // export a metric, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "failure-counter"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Asynchronous handler of runtime events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. Runs on the subscriber's own worker task.
    async fn on_event(&self, ev: &Event);

    /// Stable name used when reporting overflow or panics of this subscriber.
    fn name(&self) -> &'static str {
        "subscriber"
    }

    /// Capacity of this subscriber's queue (clamped to `>= 1`).
    fn queue_capacity(&self) -> usize {
        256
    }
}
