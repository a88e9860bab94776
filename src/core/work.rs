//! Work items and their results.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::JobError;

/// Opaque work item identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of submitted work. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem<P> {
    /// Caller-chosen identifier.
    pub id: ItemId,
    /// Caller-defined data.
    pub payload: P,
}

impl<P> WorkItem<P> {
    /// Create a work item.
    pub fn new(id: impl Into<ItemId>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// Outcome of one accepted work item. Exactly one is produced per item that
/// a worker claims and finishes.
#[derive(Debug)]
pub struct JobResult<P, O> {
    /// The item that was processed.
    pub item: WorkItem<P>,
    /// Output of the processing function, or why it failed.
    pub outcome: Result<O, JobError>,
    /// Wall-clock execution time of the processing function.
    pub duration: Duration,
    /// Time between acceptance into the queue and start of execution,
    /// including the admission wait.
    pub queued_for: Duration,
    /// Worker that produced the result.
    pub worker_id: usize,
}

impl<P, O> JobResult<P, O> {
    /// Whether the processing function succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The output, if processing succeeded.
    #[must_use]
    pub fn output(&self) -> Option<&O> {
        self.outcome.as_ref().ok()
    }

    /// The failure, if processing failed.
    #[must_use]
    pub fn error(&self) -> Option<&JobError> {
        self.outcome.as_ref().err()
    }
}
