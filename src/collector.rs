//! Rolls bus events up into change sets and hands them to the indexer on demand.
//!
//! The collector thread owns the current [`ChangeSet`]. A consumer calling
//! [`Collector::take_batch`] meets the thread on a zero-capacity channel; once
//! paired, the thread folds in every event already delivered to it, sends the
//! set across a second rendezvous, and starts over with an empty one. Tracking
//! and handoff run on the same thread, so no event can fall between the set that
//! was handed off and its replacement.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, select};

use crate::bus::EventBus;
use crate::cancel::CancellationToken;
use crate::changeset::ChangeSet;
use crate::error::{IndexError, Result};
use crate::types::ChangeEvent;

/// Consumer side of a running collector.
#[derive(Debug)]
pub struct Collector {
    ready: Sender<()>,
    handoff: Receiver<ChangeSet>,
    worker: Option<JoinHandle<()>>,
}

struct Subscription {
    bus: EventBus,
    channel: Sender<ChangeEvent>,
}

impl Collector {
    /// Subscribe to `bus` and start collecting. The collector unregisters itself
    /// when `cancel` fires.
    pub fn start(bus: &EventBus, cancel: &CancellationToken) -> Result<Self> {
        let (channel, events) = bus.subscribe();
        let subscription = Subscription {
            bus: bus.clone(),
            channel,
        };
        Self::spawn_inner(events, Some(subscription), cancel)
    }

    /// Collect from an arbitrary event channel instead of a bus subscription.
    pub fn spawn(events: Receiver<ChangeEvent>, cancel: &CancellationToken) -> Result<Self> {
        Self::spawn_inner(events, None, cancel)
    }

    fn spawn_inner(
        events: Receiver<ChangeEvent>,
        subscription: Option<Subscription>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let (ready, ready_rx) = bounded(0);
        let (handoff_tx, handoff) = bounded(0);
        let cancel = cancel.clone();
        let worker = thread::Builder::new()
            .name("search-collector".into())
            .spawn(move || {
                collect(&events, &ready_rx, &handoff_tx, &cancel);
                if let Some(sub) = subscription {
                    sub.bus.unregister(&sub.channel);
                }
                tracing::debug!("search collector stopped");
            })?;

        Ok(Self {
            ready,
            handoff,
            worker: Some(worker),
        })
    }

    /// Take everything collected so far, leaving the collector with an empty set.
    ///
    /// Blocks until the collector thread pairs with this call. Events already
    /// delivered to the collector are included; later ones go to the next batch.
    /// The returned set may be empty.
    pub fn take_batch(&self) -> Result<ChangeSet> {
        self.ready
            .send(())
            .map_err(|_| IndexError::CollectorClosed)?;
        self.handoff.recv().map_err(|_| IndexError::CollectorClosed)
    }

    /// Wait for the collector thread to exit. Call after cancelling.
    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("search collector thread panicked");
            }
        }
    }
}

fn collect(
    events: &Receiver<ChangeEvent>,
    ready: &Receiver<()>,
    handoff: &Sender<ChangeSet>,
    cancel: &CancellationToken,
) {
    let mut current = ChangeSet::new();
    let mut events_open = true;

    loop {
        // With the event source gone, only handoff and cancellation remain.
        let never = crossbeam_channel::never();
        let source = if events_open { events } else { &never };

        select! {
            recv(source) -> msg => match msg {
                Ok(event) => {
                    current.track(event);
                }
                Err(_) => events_open = false,
            },
            recv(ready) -> msg => {
                if msg.is_err() {
                    return;
                }
                if events_open {
                    events_open = drain(events, &mut current);
                }
                let batch = std::mem::take(&mut current);
                select! {
                    send(handoff, batch) -> res => {
                        if res.is_err() {
                            return;
                        }
                    }
                    recv(cancel.done()) -> _ => return,
                }
            },
            recv(cancel.done()) -> _ => return,
        }
    }
}

/// Track every event already waiting. Returns `false` once the source disconnects.
fn drain(events: &Receiver<ChangeEvent>, current: &mut ChangeSet) -> bool {
    loop {
        match events.try_recv() {
            Ok(event) => {
                current.track(event);
            }
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}
