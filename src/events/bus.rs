//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (runners, scopes, the
//! entry point).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                Subscriber (one):
//!   Runner 1 ──┐
//!   Runner 2 ──┼──────► Bus ──────► forward loop ────► SubscriberSet
//!   Scope    ──┤  (broadcast chan)  (in Runtime)
//!   Runtime  ──┘
//! ```
//!
//! taskscope uses a single internal receiver (the runtime's forward loop) that
//! fans events out to user subscribers via
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks or awaits.
//! - **Bounded capacity**: a single ring buffer stores recent events for all
//!   receivers; the minimum capacity is 1 (clamped).
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip the
//!   `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at
//!   send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender); every component
/// that publishes lifecycle events keeps its own clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to `>= 1`).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped; publishing still
    /// returns immediately.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    ///
    /// Each call creates an independent receiver; a receiver only gets events
    /// sent after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::TaskSpawned).with_task("t"));
        let ev = rx.recv().await.expect("event delivered");
        assert_eq!(ev.kind, EventKind::TaskSpawned);
        assert_eq!(ev.task.as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn test_publish_without_receivers_is_silent() {
        let bus = Bus::new(4);
        // No receiver subscribed: the send error is swallowed.
        bus.publish(Event::new(EventKind::RuntimeStarted));
    }

    #[tokio::test]
    async fn test_receiver_only_sees_later_events() {
        let bus = Bus::new(16);
        bus.publish(Event::new(EventKind::RuntimeStarted));
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::RuntimeStopped));
        let ev = rx.recv().await.expect("event delivered");
        assert_eq!(ev.kind, EventKind::RuntimeStopped);
    }
}
