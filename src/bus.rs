//! Publish/subscribe fan-out of entity change notifications.
//!
//! Publishers push onto a single shallow queue drained by one dispatch thread,
//! which hands each event to every registered channel in turn. The bus keeps no
//! buffer of its own for subscribers: a subscriber whose channel is full stalls
//! fan-out for everyone behind it, so subscribers must be fast in-process
//! consumers. Events are fire-and-forget; a channel registered after an event
//! was dispatched never sees it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded, select};

use crate::cancel::CancellationToken;
use crate::constants::{DEFAULT_BUS_QUEUE_DEPTH, DEFAULT_SUBSCRIBER_CAPACITY};
use crate::error::{IndexError, Result};
use crate::types::ChangeEvent;

type Subscribers = Arc<Mutex<Vec<Sender<ChangeEvent>>>>;

/// Handle to a running event bus. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    queue: Sender<ChangeEvent>,
    subscribers: Subscribers,
    subscriber_capacity: usize,
}

impl EventBus {
    /// Start a bus with the default queue depth of one.
    pub fn start(cancel: &CancellationToken) -> Result<Self> {
        Self::with_options(DEFAULT_BUS_QUEUE_DEPTH, DEFAULT_SUBSCRIBER_CAPACITY, cancel)
    }

    /// Start a bus whose publish queue holds `queue_depth` events ahead of fan-out.
    ///
    /// The dispatch thread exits when `cancel` fires or every handle is dropped.
    pub fn with_options(
        queue_depth: usize,
        subscriber_capacity: usize,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let (queue, rx) = bounded(queue_depth.max(1));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));

        let dispatch_subscribers = Arc::clone(&subscribers);
        let cancel = cancel.clone();
        thread::Builder::new()
            .name("event-bus".into())
            .spawn(move || dispatch(&rx, &dispatch_subscribers, &cancel))?;

        Ok(Self {
            queue,
            subscribers,
            subscriber_capacity: subscriber_capacity.max(1),
        })
    }

    /// Add a channel to the fan-out. Registering the same channel twice is a no-op.
    pub fn register(&self, channel: Sender<ChangeEvent>) {
        let mut subscribers = lock(&self.subscribers);
        if !subscribers.iter().any(|s| s.same_channel(&channel)) {
            subscribers.push(channel);
        }
    }

    /// Remove a channel from the fan-out. Returns whether it was registered.
    pub fn unregister(&self, channel: &Sender<ChangeEvent>) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|s| !s.same_channel(channel));
        subscribers.len() != before
    }

    /// Create a bounded channel, register its sender, and return both ends.
    /// Keep the sender to unregister later.
    pub fn subscribe(&self) -> (Sender<ChangeEvent>, Receiver<ChangeEvent>) {
        let (tx, rx) = bounded(self.subscriber_capacity);
        self.register(tx.clone());
        (tx, rx)
    }

    /// Queue an event for fan-out, blocking while the queue is full.
    pub fn publish(&self, event: ChangeEvent) -> Result<()> {
        self.queue.send(event).map_err(|_| IndexError::BusClosed)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

fn lock(subscribers: &Subscribers) -> MutexGuard<'_, Vec<Sender<ChangeEvent>>> {
    // Only Vec push/retain run under this lock; a poisoned guard still holds a valid list.
    match subscribers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn dispatch(queue: &Receiver<ChangeEvent>, subscribers: &Subscribers, cancel: &CancellationToken) {
    loop {
        let event = select! {
            recv(queue) -> msg => match msg {
                Ok(event) => event,
                Err(_) => break,
            },
            recv(cancel.done()) -> _ => break,
        };

        // Snapshot so register/unregister never wait on a slow subscriber.
        let targets: Vec<Sender<ChangeEvent>> = lock(subscribers).clone();
        for target in targets {
            select! {
                send(target, event) -> res => {
                    if res.is_err() {
                        tracing::debug!(entity = %event.entity_type, id = event.id, "dropping disconnected subscriber");
                        lock(subscribers).retain(|s| !s.same_channel(&target));
                    }
                }
                recv(cancel.done()) -> _ => return,
            }
        }
    }
    tracing::debug!("event bus dispatch stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::TryRecvError;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn publish_reaches_every_subscriber() {
        let cancel = CancellationToken::new();
        let bus = EventBus::start(&cancel).unwrap();
        let (_a_tx, a) = bus.subscribe();
        let (_b_tx, b) = bus.subscribe();

        bus.publish(ChangeEvent::scene(1)).unwrap();

        assert_eq!(a.recv_timeout(WAIT).unwrap(), ChangeEvent::scene(1));
        assert_eq!(b.recv_timeout(WAIT).unwrap(), ChangeEvent::scene(1));
        cancel.cancel();
    }

    #[test]
    fn register_is_idempotent() {
        let cancel = CancellationToken::new();
        let bus = EventBus::start(&cancel).unwrap();
        let (tx, rx) = bounded(4);
        bus.register(tx.clone());
        bus.register(tx.clone());
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(ChangeEvent::tag(9)).unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ChangeEvent::tag(9));
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(crossbeam_channel::RecvTimeoutError::Timeout)
        ));

        assert!(bus.unregister(&tx));
        assert!(!bus.unregister(&tx));
        cancel.cancel();
    }

    #[test]
    fn unregistered_channel_never_receives() {
        const CHANNELS: usize = 16;
        const ROUNDS: u64 = 200;

        let cancel = CancellationToken::new();
        let bus = EventBus::start(&cancel).unwrap();
        let channels: Vec<_> = (0..CHANNELS).map(|_| bounded::<ChangeEvent>(1)).collect();
        for (tx, _) in &channels {
            bus.register(tx.clone());
        }

        for round in 0..ROUNDS {
            let skipped = fastrand::usize(..CHANNELS);
            assert!(bus.unregister(&channels[skipped].0));

            let event = ChangeEvent::scene(round);
            bus.publish(event).unwrap();

            for (i, (_, rx)) in channels.iter().enumerate() {
                if i == skipped {
                    continue;
                }
                assert_eq!(rx.recv_timeout(WAIT).unwrap(), event, "channel {i}");
            }
            assert_eq!(channels[skipped].1.try_recv(), Err(TryRecvError::Empty));

            bus.register(channels[skipped].0.clone());
        }
        cancel.cancel();
    }

    #[test]
    fn disconnected_subscribers_are_pruned() {
        let cancel = CancellationToken::new();
        let bus = EventBus::start(&cancel).unwrap();
        let (_gone_tx, gone) = bus.subscribe();
        let (_live_tx, live) = bus.subscribe();
        drop(gone);

        bus.publish(ChangeEvent::studio(3)).unwrap();
        assert_eq!(live.recv_timeout(WAIT).unwrap(), ChangeEvent::studio(3));
        // Fan-out visits subscribers in order, so the dead one was pruned first.
        assert_eq!(bus.subscriber_count(), 1);
        cancel.cancel();
    }

    #[test]
    fn publish_fails_after_cancel() {
        let cancel = CancellationToken::new();
        let bus = EventBus::start(&cancel).unwrap();
        cancel.cancel();

        let deadline = std::time::Instant::now() + WAIT;
        loop {
            if bus.publish(ChangeEvent::scene(1)).is_err() {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "bus kept accepting events");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}
