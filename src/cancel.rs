//! Cancellation tokens for the engine's long-running loops.
//!
//! A token can be polled (`is_cancelled`, `check`) from tight loops, and it also
//! exposes a channel that disconnects on cancellation so blocking loops can
//! `select!` on it next to their work channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::error::{IndexError, Result};

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    // Dropped on cancel; every `done()` receiver then reports disconnection.
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

/// Shared cancellation signal. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        let (trigger, done) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                done,
            }),
        }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let mut trigger = match self.inner.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        trigger.take();
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(IndexError::Cancelled)` once cancelled, for use with `?`.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(IndexError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Receiver that never yields a value and disconnects on cancellation.
    #[must_use]
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
