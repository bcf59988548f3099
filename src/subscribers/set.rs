//! # Fan-out delivery of events to subscribers.
//!
//! [`SubscriberSet`] gives every subscriber a bounded queue and a worker task
//! so that one slow or broken subscriber cannot stall the runtime or its
//! peers.
//!
//! ## Architecture
//! ```text
//! SubscriberSet::emit(&Event)
//!   ├─► [queue S1] ──► worker S1 ──► s1.on_event(&ev)
//!   ├─► [queue S2] ──► worker S2 ──► s2.on_event(&ev)
//!   └─► [queue SN] ──► worker SN ──► sN.on_event(&ev)
//!                        └─► panic caught ──► SubscriberPanicked on the bus
//! ```
//!
//! ## Overflow behavior
//! 1. The new event is dropped for the full subscriber only.
//! 2. The runtime publishes `SubscriberOverflow` (unless the dropped event
//!    was itself a delivery report, which would loop).
//! 3. Other subscribers are unaffected.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::dispatch::Dispatcher;
use crate::error::panic_message;
use crate::events::{Bus, Event};
use crate::subscribers::subscriber::Subscribe;

struct Slot {
    name: &'static str,
    tx: mpsc::Sender<Event>,
}

/// Per-subscriber queues plus the bus used to report delivery problems.
pub struct SubscriberSet {
    slots: Vec<Slot>,
    bus: Bus,
}

impl SubscriberSet {
    /// Starts one worker task per subscriber on the given dispatcher and
    /// returns the fan-out handle.
    pub(crate) fn start(
        dispatcher: &Arc<Dispatcher>,
        bus: &Bus,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Arc<Self> {
        let mut slots = Vec::with_capacity(subscribers.len());
        for sub in subscribers {
            let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
            slots.push(Slot {
                name: sub.name(),
                tx,
            });
            dispatcher.spawn(worker(sub, rx, bus.clone()));
        }
        Arc::new(Self {
            slots,
            bus: bus.clone(),
        })
    }

    /// Returns the number of registered subscribers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when no subscribers are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Queues `ev` for every subscriber without awaiting any of them.
    pub(crate) fn emit(&self, ev: &Event) {
        for slot in &self.slots {
            match slot.tx.try_send(ev.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => self.report(slot.name, ev, "full"),
                Err(mpsc::error::TrySendError::Closed(_)) => self.report(slot.name, ev, "closed"),
            }
        }
    }

    fn report(&self, name: &'static str, dropped: &Event, reason: &'static str) {
        if !dropped.is_delivery_report() {
            self.bus.publish(Event::subscriber_overflow(name, reason));
        }
    }
}

/// Sequential delivery loop for one subscriber.
async fn worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Event>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let delivery = std::panic::AssertUnwindSafe(sub.on_event(&ev)).catch_unwind();
        if let Err(payload) = delivery.await {
            if !ev.is_delivery_report() {
                bus.publish(Event::subscriber_panicked(
                    sub.name(),
                    panic_message(payload.as_ref()),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.seen.lock().expect("recorder lock").push(ev.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Grumpy;

    #[async_trait]
    impl Subscribe for Grumpy {
        async fn on_event(&self, _ev: &Event) {
            panic!("always grumpy");
        }

        fn name(&self) -> &'static str {
            "grumpy"
        }
    }

    #[test]
    fn test_events_reach_every_subscriber() {
        let pool = Dispatcher::worker_pool("set-test", 2).expect("pool builds");
        let bus = Bus::new(64);
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let set = SubscriberSet::start(&pool, &bus, vec![recorder.clone()]);
        assert_eq!(set.len(), 1);

        pool.block_on(async {
            set.emit(&Event::new(EventKind::TaskSpawned));
            set.emit(&Event::new(EventKind::TaskCompleted));
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let seen = recorder.seen.lock().expect("recorder lock").clone();
        assert_eq!(seen, vec![EventKind::TaskSpawned, EventKind::TaskCompleted]);
    }

    #[test]
    fn test_panicking_subscriber_is_reported_and_isolated() {
        let pool = Dispatcher::worker_pool("panic-test", 2).expect("pool builds");
        let bus = Bus::new(64);
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let set = SubscriberSet::start(&pool, &bus, vec![Arc::new(Grumpy), recorder.clone()]);

        pool.block_on(async {
            let mut rx = bus.subscribe();
            set.emit(&Event::new(EventKind::TaskStarting));
            let report = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("panic report published")
                .expect("bus open");
            assert_eq!(report.kind, EventKind::SubscriberPanicked);
            assert_eq!(report.task.as_deref(), Some("grumpy"));
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        // The healthy subscriber still got the event.
        let seen = recorder.seen.lock().expect("recorder lock").clone();
        assert_eq!(seen, vec![EventKind::TaskStarting]);
    }
}
