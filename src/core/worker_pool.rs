//! Worker pool with dedicated worker threads and token-bucket admission.
//!
//! `WorkerPool` runs a fixed number of OS threads. Each one claims items from
//! a shared bounded queue, waits for an admission token, runs the
//! caller-supplied processor on its own single-threaded tokio runtime and
//! publishes one `JobResult` to a bounded result channel.
//!
//! # Key Features
//!
//! - **Bounded concurrency**: at most `worker_count` items execute at once
//! - **Admission control**: shared token bucket bounds the start rate
//! - **Ordered shutdown**: cancel (or close intake), close queue, join workers, close results
//! - **Isolation**: a panicking processor produces a failed result, not a dead pool
//!
//! # Example
//!
//! ```rust,ignore
//! use gated_pool::config::{AdmissionConfig, WorkerPoolConfig};
//! use gated_pool::core::{FnProcessor, WorkItem, WorkerPool};
//!
//! let pool = WorkerPool::new(
//!     WorkerPoolConfig::new()
//!         .with_worker_count(3)
//!         .with_queue_capacity(10)
//!         .with_admission(AdmissionConfig::new(5, 5.0)),
//!     FnProcessor::new(|item: &WorkItem<u32>| Ok(format!("done:{}", item.id))),
//! )?;
//! pool.start()?;
//! pool.submit(WorkItem::new(1_u64, 7))?;
//! let results = pool.results();
//! pool.drain();
//! for result in results { /* ... */ }
//! ```

mod native;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub use native::WorkerPool;

/// Snapshot of pool activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,

    /// Items enqueued by `submit`/`try_submit`. Submitters still waiting
    /// for queue space are not counted.
    pub submitted: u64,

    /// Items sitting in the queue right now.
    pub queued: u64,

    /// Items currently executing.
    pub active: u64,

    /// Items whose processor returned `Ok`.
    pub completed: u64,

    /// Items whose processor returned an error.
    pub failed: u64,

    /// Items whose processor panicked.
    pub panicked: u64,

    /// Accepted items that never reached the result channel because of
    /// cancellation (left in the queue, cancelled during admission, or
    /// result dropped at publish).
    pub discarded: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub submitted: AtomicU64,
    pub active: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub panicked: AtomicU64,
    pub discarded: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics; `queued` is read from the queue itself.
    pub fn snapshot(&self, worker_count: usize, queued: usize) -> PoolStats {
        PoolStats {
            worker_count,
            submitted: self.submitted.load(Ordering::Relaxed),
            queued: queued as u64,
            active: self.active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    /// Called once the item is in the queue.
    pub fn record_accepted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }
}
