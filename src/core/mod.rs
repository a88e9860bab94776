//! Core pool abstractions: work items, processors, lifecycle and the worker pool.

pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod shutdown;
pub mod work;
pub mod worker_pool;

pub use error::{AdmissionError, AppResult, JobError, PoolError};
pub use executor::{FnProcessor, JobProcessor};
pub use lifecycle::{PoolState, ShutdownMode};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
pub use work::{ItemId, JobResult, WorkItem};
pub use worker_pool::{PoolStats, WorkerPool};
