//! One-shot broadcast shutdown signal.
//!
//! The trigger owns the only `Sender` of a channel on which nothing is ever
//! sent. Firing drops that sender, so every `Receiver` clone observes
//! disconnection at the same time. Receivers can therefore sit inside a
//! `crossbeam_channel::select!` next to the work queue or result channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

/// Message type of the signal channel; nothing is ever sent.
#[derive(Debug)]
pub enum Never {}

/// Creates a connected trigger/signal pair.
#[must_use]
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = bounded::<Never>(0);
    let fired = Arc::new(AtomicBool::new(false));
    (
        ShutdownTrigger {
            tx: Mutex::new(Some(tx)),
            fired: Arc::clone(&fired),
        },
        ShutdownSignal { rx, fired },
    )
}

/// The firing half. Not `Clone`: exactly one owner may fire.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: Mutex<Option<Sender<Never>>>,
    fired: Arc<AtomicBool>,
}

impl ShutdownTrigger {
    /// Fire the signal. Returns `true` for the call that actually fired it.
    pub fn fire(&self) -> bool {
        let sender = self.tx.lock().take();
        if sender.is_none() {
            return false;
        }
        self.fired.store(true, Ordering::Release);
        drop(sender);
        true
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Drop for ShutdownTrigger {
    fn drop(&mut self) {
        self.fire();
    }
}

/// The listening half, cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: Receiver<Never>,
    fired: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Whether the signal has fired (lock-free).
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Block until the signal fires.
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }

    /// Sleep for up to `timeout`. Returns `true` if the signal fired.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(never) => match never {},
            Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// Receiver to use as a `recv(..)` arm in `crossbeam_channel::select!`.
    /// The arm completes with `Err(RecvError)` once the signal fires.
    #[must_use]
    pub const fn receiver(&self) -> &Receiver<Never> {
        &self.rx
    }
}
