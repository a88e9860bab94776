//! Bounded channel of finished results.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

pub use crossbeam_channel::{RecvTimeoutError, TryRecvError};

/// Bounded buffer of results for the caller to drain.
///
/// The channel closes once the pool's own sender is dropped and every
/// worker holding a clone has exited.
pub struct ResultChannel<R> {
    tx: Mutex<Option<Sender<R>>>,
    rx: Receiver<R>,
    capacity: usize,
}

impl<R> ResultChannel<R> {
    /// Create a channel holding at most `capacity` undrained results.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            capacity,
        }
    }

    /// Maximum number of buffered results.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Results buffered right now.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// A sender for a worker, or `None` once the channel is closed.
    pub(crate) fn sender(&self) -> Option<Sender<R>> {
        self.tx.lock().clone()
    }

    /// Drop the pool's sender. Returns `true` for the call that closed it.
    pub(crate) fn close(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    /// A consuming view over the channel.
    #[must_use]
    pub fn results(&self) -> Results<R> {
        Results {
            rx: self.rx.clone(),
        }
    }
}

/// Finite sequence of results.
///
/// Iteration blocks for the next result and ends once the pool has stopped
/// and every buffered result has been taken. Handles share one underlying
/// channel: each result is yielded to exactly one of them.
#[derive(Debug, Clone)]
pub struct Results<R> {
    rx: Receiver<R>,
}

impl<R> Results<R> {
    /// Wait up to `timeout` for the next result.
    ///
    /// # Errors
    ///
    /// `Timeout` if nothing arrived, `Disconnected` once the sequence is exhausted.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<R, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Take a result if one is buffered.
    ///
    /// # Errors
    ///
    /// `Empty` if nothing is buffered, `Disconnected` once the sequence is exhausted.
    pub fn try_recv(&self) -> Result<R, TryRecvError> {
        self.rx.try_recv()
    }
}

impl<R> Iterator for Results<R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        self.rx.recv().ok()
    }
}
