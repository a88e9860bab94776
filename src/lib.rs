//! # Gated Pool
//!
//! A bounded concurrent worker pool with token-bucket admission control and
//! ordered, idempotent shutdown.
//!
//! Items are accepted into a bounded FIFO queue, executed by a fixed number
//! of worker threads, throttled by a shared token bucket, and reported on a
//! bounded result channel that ends once the pool has stopped.
//!
//! ## Key Features
//!
//! - **Bounded Concurrency**: at most `worker_count` items execute at once
//! - **Backpressure**: `submit` waits on a full queue instead of dropping work
//! - **Admission Control**: burst `capacity` tokens, refilled at `rate_per_second`
//! - **Exactly One Result**: every executed item yields one `JobResult`, including
//!   processor errors and panics
//! - **Ordered Shutdown**: `stop` cancels first; `drain` finishes queued work first.
//!   Both are idempotent and never hang on blocked workers
//!
//! ## WorkerPool
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
//!
//! let results = pool.results();
//! let consumer = std::thread::spawn(move || results.collect::<Vec<_>>());
//! for id in 1..=20_u64 {
//!     pool.submit(WorkItem::new(id, 0))?;
//! }
//! pool.drain();
//! let collected = consumer.join().unwrap();
//! assert_eq!(collected.len(), 20);
//! ```
//!
//! ## Standalone Rate Limiting
//!
//! ```rust,ignore
//! use gated_pool::admission::RateLimiter;
//! use gated_pool::config::AdmissionConfig;
//!
//! let limiter = RateLimiter::new(&AdmissionConfig::new(5, 5.0))?;
//! assert!(limiter.allow());
//! limiter.stop(); // wakes anyone blocked in allow()
//! ```
//!
//! For complete examples, see:
//! - `tests/worker_pool_test.rs` - pool behavior end to end
//! - `tests/admission_test.rs` - rate limiting timing

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Admission control: token buckets and keyed limiters.
pub mod admission;
/// Builders to construct pools from configuration.
pub mod builders;
/// Configuration models for pools and admission control.
pub mod config;
/// Core pool abstractions, lifecycle and the worker pool.
pub mod core;
/// Bounded work and result queues.
pub mod infra;
/// Shared utilities.
pub mod util;
