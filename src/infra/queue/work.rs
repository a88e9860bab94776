//! Bounded FIFO of pending work items.

use std::fmt;
use std::time::Instant;

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::RwLock;

use crate::core::error::PoolError;
use crate::core::shutdown::ShutdownSignal;
use crate::core::work::WorkItem;

/// A work item together with its acceptance time.
#[derive(Debug)]
pub(crate) struct Queued<P> {
    pub item: WorkItem<P>,
    pub accepted_at: Instant,
}

impl<P> Queued<P> {
    fn new(item: WorkItem<P>) -> Self {
        Self {
            item,
            accepted_at: Instant::now(),
        }
    }
}

/// Error from a non-blocking submit; the item is handed back.
pub enum TrySubmitError<P> {
    /// The queue is at capacity.
    Full(WorkItem<P>),
    /// Shutdown has begun.
    ShuttingDown(WorkItem<P>),
}

impl<P> TrySubmitError<P> {
    /// Recover the rejected item.
    pub fn into_item(self) -> WorkItem<P> {
        match self {
            Self::Full(item) | Self::ShuttingDown(item) => item,
        }
    }
}

impl<P> fmt::Debug for TrySubmitError<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(item) => f.debug_tuple("Full").field(&item.id).finish(),
            Self::ShuttingDown(item) => f.debug_tuple("ShuttingDown").field(&item.id).finish(),
        }
    }
}

impl<P> fmt::Display for TrySubmitError<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(item) => write!(f, "work queue is full (item {})", item.id),
            Self::ShuttingDown(item) => write!(f, "pool shutting down (item {})", item.id),
        }
    }
}

impl<P> std::error::Error for TrySubmitError<P> {}

/// Bounded queue of work items awaiting a free worker.
///
/// Items are claimed in FIFO order. Closing drops the only sender; workers
/// then drain what is left and observe disconnection.
pub struct WorkQueue<P> {
    /// Sender side; `None` once closed. Submitters hold the read lock while
    /// they wait for space, so closing (write lock) waits for them to finish
    /// or give up.
    tx: RwLock<Option<Sender<Queued<P>>>>,
    rx: Receiver<Queued<P>>,
    capacity: usize,
}

impl<P> WorkQueue<P> {
    /// Create a queue holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx: RwLock::new(Some(tx)),
            rx,
            capacity,
        }
    }

    /// Maximum number of queued items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Whether the queue no longer accepts items.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.read().is_none()
    }

    /// Enqueue, waiting for space unless `closing` fires first.
    pub(crate) fn push(&self, item: WorkItem<P>, closing: &ShutdownSignal) -> Result<(), PoolError> {
        if closing.is_fired() {
            return Err(PoolError::ShuttingDown);
        }
        let guard = self.tx.read();
        let Some(tx) = guard.as_ref() else {
            return Err(PoolError::ShuttingDown);
        };
        select! {
            send(tx, Queued::new(item)) -> sent => sent.map_err(|_| PoolError::ShuttingDown),
            recv(closing.receiver()) -> _ => Err(PoolError::ShuttingDown),
        }
    }

    /// Enqueue only if there is space right now.
    pub(crate) fn try_push(&self, item: WorkItem<P>) -> Result<(), TrySubmitError<P>> {
        let guard = self.tx.read();
        let Some(tx) = guard.as_ref() else {
            return Err(TrySubmitError::ShuttingDown(item));
        };
        match tx.try_send(Queued::new(item)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(queued)) => Err(TrySubmitError::Full(queued.item)),
            Err(TrySendError::Disconnected(queued)) => Err(TrySubmitError::ShuttingDown(queued.item)),
        }
    }

    /// Receiver handle for a worker.
    pub(crate) fn receiver(&self) -> Receiver<Queued<P>> {
        self.rx.clone()
    }

    /// Stop accepting items. Returns `true` for the call that closed it.
    pub(crate) fn close(&self) -> bool {
        self.tx.write().take().is_some()
    }

    /// Drop whatever is still queued and return how many items that was.
    pub(crate) fn discard_remaining(&self) -> usize {
        self.rx.try_iter().count()
    }
}
