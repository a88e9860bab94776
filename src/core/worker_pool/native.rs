//! Native implementation of `WorkerPool` using OS threads.
//!
//! Each worker thread owns a single-threaded tokio runtime on which it drives
//! the processor, so async processors never block the caller's runtime.
//!
//! # Design Principles
//!
//! - **No polling**: workers block in `select!` on the queue and the cancel signal
//! - **Single writer**: only the shutdown path closes the queue, results and signals
//! - **Clean shutdown**: a closed queue or a fired cancel signal ends each worker loop

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::admission::AdmissionController;
use crate::config::WorkerPoolConfig;
use crate::core::error::{JobError, PoolError};
use crate::core::executor::JobProcessor;
use crate::core::lifecycle::{Lifecycle, PoolState, ShutdownMode};
use crate::core::shutdown::ShutdownSignal;
use crate::core::work::{ItemId, JobResult, WorkItem};
use crate::infra::queue::work::Queued;
use crate::infra::queue::{ResultChannel, Results, TrySubmitError, WorkQueue};

use super::{PoolCounters, PoolStats};

/// Bounded worker pool with admission control and ordered shutdown.
///
/// # Design
///
/// - **Fixed concurrency**: `worker_count` threads, each executing one item at a time
/// - **Backpressure**: `submit` blocks on a full queue; workers block on a full result channel
/// - **Lock-free fast path**: atomic counters, `RwLock` read side for submitters
pub struct WorkerPool<P, O, J>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    J: JobProcessor<P, O>,
{
    /// Pool configuration.
    config: WorkerPoolConfig,

    /// Instance id recorded on lifecycle log lines.
    pool_id: Uuid,

    /// Processor cloned into each worker at start.
    processor: J,

    /// Pending items.
    queue: WorkQueue<P>,

    /// Finished results.
    results: ResultChannel<JobResult<P, O>>,

    /// Token bucket shared by all workers.
    admission: Arc<AdmissionController>,

    /// State machine and shutdown triggers.
    lifecycle: Lifecycle,

    /// Pool statistics counters (lock-free atomics).
    counters: Arc<PoolCounters>,

    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<()>>>,

    /// Id counter for `submit_payload`.
    next_id: AtomicU64,
}

impl<P, O, J> WorkerPool<P, O, J>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    J: JobProcessor<P, O>,
{
    /// Create a pool in the `Created` state. Workers are launched by [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` for a zero worker count or queue
    /// bound, or invalid admission settings.
    pub fn new(config: WorkerPoolConfig, processor: J) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let lifecycle = Lifecycle::new();
        let admission = AdmissionController::new(config.admission.as_ref(), lifecycle.cancel_signal())?;
        let pool_id = Uuid::new_v4();

        info!(
            %pool_id,
            worker_count = config.worker_count,
            queue_capacity = config.queue_capacity,
            result_capacity = config.effective_result_capacity(),
            throttled = config.admission.is_some(),
            "WorkerPool created"
        );

        Ok(Self {
            queue: WorkQueue::new(config.queue_capacity),
            results: ResultChannel::new(config.effective_result_capacity()),
            admission: Arc::new(admission),
            lifecycle,
            counters: Arc::new(PoolCounters::default()),
            workers: Mutex::new(Vec::with_capacity(config.worker_count)),
            next_id: AtomicU64::new(0),
            processor,
            pool_id,
            config,
        })
    }

    /// Launch the worker threads.
    ///
    /// # Errors
    ///
    /// - `PoolError::AlreadyStarted` on a second call
    /// - `PoolError::ShuttingDown` once shutdown has begun
    /// - `PoolError::Internal` if a worker thread or runtime cannot be created;
    ///   the pool is then stopped
    pub fn start(&self) -> Result<(), PoolError> {
        let spawned = {
            // Held while spawning so a racing shutdown joins every worker.
            let mut workers = self.workers.lock();
            self.lifecycle.begin_start()?;

            let Some(results_tx) = self.results.sender() else {
                return Err(PoolError::ShuttingDown);
            };

            let mut spawned = Ok(());
            for worker_id in 0..self.config.worker_count {
                let worker = Worker {
                    id: worker_id,
                    jobs: self.queue.receiver(),
                    results: results_tx.clone(),
                    admission: Arc::clone(&self.admission),
                    cancel: self.lifecycle.cancel_signal(),
                    counters: Arc::clone(&self.counters),
                    processor: self.processor.clone(),
                };
                match spawn_worker(worker, self.config.thread_stack_size) {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        error!(worker_id, error = %e, "failed to spawn worker");
                        spawned = Err(e);
                        break;
                    }
                }
            }
            spawned
        };

        if let Err(e) = spawned {
            self.stop();
            return Err(e);
        }

        info!(
            pool_id = %self.pool_id,
            worker_count = self.config.worker_count,
            "WorkerPool started"
        );
        Ok(())
    }

    /// Enqueue an item, waiting for queue space if necessary.
    ///
    /// # Errors
    ///
    /// `PoolError::ShuttingDown` if shutdown began before the item was
    /// enqueued; the item is dropped. Callers ignoring this error lose the item.
    pub fn submit(&self, item: WorkItem<P>) -> Result<(), PoolError> {
        let item_id = item.id;
        if let Err(e) = self.queue.push(item, self.lifecycle.closing_signal()) {
            debug!(item_id = %item_id, "submit rejected: pool shutting down");
            return Err(e);
        }
        self.counters.record_accepted();
        debug!(item_id = %item_id, "item submitted");
        Ok(())
    }

    /// Wrap `payload` with the next pool-assigned id and submit it.
    ///
    /// Assigned ids start at 1 and are unique within this pool; they can
    /// collide with ids chosen by the caller for [`submit`](Self::submit).
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub fn submit_payload(&self, payload: P) -> Result<ItemId, PoolError> {
        let id = ItemId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.submit(WorkItem::new(id, payload))?;
        Ok(id)
    }

    /// Enqueue an item only if there is space right now.
    ///
    /// # Errors
    ///
    /// `TrySubmitError::Full` or `TrySubmitError::ShuttingDown`, both of which
    /// hand the item back.
    pub fn try_submit(&self, item: WorkItem<P>) -> Result<(), TrySubmitError<P>> {
        if self.lifecycle.closing_signal().is_fired() {
            return Err(TrySubmitError::ShuttingDown(item));
        }
        self.queue.try_push(item)?;
        self.counters.record_accepted();
        Ok(())
    }

    /// The sequence of results.
    ///
    /// Iterating blocks for the next result and ends after shutdown completes
    /// and every buffered result has been taken. Callers must keep draining
    /// while workers run, or workers block on a full result channel.
    #[must_use]
    pub fn results(&self) -> Results<JobResult<P, O>> {
        self.results.results()
    }

    /// Cancel-first shutdown.
    ///
    /// 1. fire cancellation (blocked submit, admission, dequeue and publish all wake)
    /// 2. close the work queue
    /// 3. join every worker
    /// 4. close the result channel
    ///
    /// Items still queued, or cancelled while waiting for admission, produce
    /// no result. Idempotent; a call racing another shutdown waits for it.
    pub fn stop(&self) {
        self.shutdown(ShutdownMode::Cancel);
    }

    /// Graceful shutdown: stop accepting items, let workers finish every
    /// queued item and publish its result, then close the result channel.
    ///
    /// The caller must keep draining [`results`](Self::results) while this
    /// runs. Idempotent; a call racing another shutdown waits for it.
    pub fn drain(&self) {
        self.shutdown(ShutdownMode::Drain);
    }

    /// Run the shutdown protocol in the given mode.
    pub fn shutdown(&self, mode: ShutdownMode) {
        if !self.lifecycle.claim_shutdown() {
            debug!(pool_id = %self.pool_id, "shutdown already complete");
            return;
        }

        info!(pool_id = %self.pool_id, ?mode, "Shutting down worker pool");

        if mode == ShutdownMode::Cancel {
            self.lifecycle.cancel();
        }
        self.lifecycle.close_intake();
        self.queue.close();
        self.lifecycle.enter_draining();

        let worker_count = self.join_workers();

        let leftover = self.queue.discard_remaining() as u64;
        if leftover > 0 {
            self.counters.record_discarded(leftover);
            warn!(pool_id = %self.pool_id, leftover, "queued items discarded at shutdown");
        }

        self.results.close();
        // Drain mode releases background admission work only now.
        self.lifecycle.cancel();
        self.admission.close();
        self.lifecycle.finish();

        info!(pool_id = %self.pool_id, worker_count, "Worker pool shut down complete");
    }

    fn join_workers(&self) -> usize {
        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for (idx, worker) in workers.drain(..).enumerate() {
            match worker.join() {
                Ok(()) => debug!(worker_id = idx, "Worker joined successfully"),
                Err(_) => warn!(worker_id = idx, "Worker panicked"),
            }
        }
        worker_count
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        self.lifecycle.state()
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.worker_count, self.queue.len())
    }

    /// The admission controller shared by the workers.
    #[must_use]
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Pool configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Instance id used in log lines.
    #[must_use]
    pub const fn pool_id(&self) -> Uuid {
        self.pool_id
    }
}

impl<P, O, J> Drop for WorkerPool<P, O, J>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    J: JobProcessor<P, O>,
{
    fn drop(&mut self) {
        // Signal shutdown but DON'T join workers in Drop; explicit
        // stop()/drain() is required for a joined shutdown.
        if !self.lifecycle.is_shutting_down() {
            self.lifecycle.cancel();
            self.lifecycle.close_intake();
            self.queue.close();
            debug!(pool_id = %self.pool_id, "WorkerPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

/// Everything one worker thread owns.
struct Worker<P, O, J> {
    id: usize,
    jobs: Receiver<Queued<P>>,
    results: Sender<JobResult<P, O>>,
    admission: Arc<AdmissionController>,
    cancel: ShutdownSignal,
    counters: Arc<PoolCounters>,
    processor: J,
}

enum Claim<P> {
    Item(Queued<P>),
    Cancelled,
    Closed,
}

impl<P, O, J> Worker<P, O, J>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    J: JobProcessor<P, O>,
{
    fn run(self, mut rt: Runtime) {
        let worker_id = self.id;
        debug!(worker_id, "Worker thread started");

        loop {
            let claim = select! {
                recv(self.cancel.receiver()) -> _ => Claim::Cancelled,
                recv(self.jobs) -> msg => msg.map_or(Claim::Closed, Claim::Item),
            };
            let queued = match claim {
                Claim::Item(queued) => queued,
                Claim::Cancelled => {
                    debug!(worker_id, "Worker cancelled while idle, exiting");
                    break;
                }
                Claim::Closed => {
                    debug!(worker_id, "Work queue closed and drained, exiting");
                    break;
                }
            };
            let item_id = queued.item.id;

            // Both arms may have been ready; cancellation wins.
            if self.cancel.is_fired() {
                self.counters.record_discarded(1);
                debug!(worker_id, item_id = %item_id, "Worker cancelled after claim, item discarded");
                break;
            }
            if !self.admission.allow() {
                self.counters.record_discarded(1);
                debug!(worker_id, item_id = %item_id, "Cancelled while waiting for admission");
                break;
            }

            let queued_for = queued.accepted_at.elapsed();
            self.counters.active.fetch_add(1, Ordering::Relaxed);
            debug!(worker_id, item_id = %item_id, "Worker executing item");

            let started = Instant::now();
            let caught = panic::catch_unwind(AssertUnwindSafe(|| {
                rt.block_on(self.processor.process(&queued.item))
            }));
            let duration = started.elapsed();
            self.counters.active.fetch_sub(1, Ordering::Relaxed);

            let panicked = caught.is_err();
            let outcome = match caught {
                Ok(Ok(output)) => {
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                    Ok(output)
                }
                Ok(Err(err)) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    debug!(worker_id, item_id = %item_id, error = %err, "Item failed");
                    Err(JobError::Failed(err))
                }
                Err(payload) => {
                    self.counters.panicked.fetch_add(1, Ordering::Relaxed);
                    let message = panic_message(payload.as_ref());
                    error!(worker_id, item_id = %item_id, panic = %message, "Processor panicked");
                    Err(JobError::Panicked(message))
                }
            };

            let result = JobResult {
                item: queued.item,
                outcome,
                duration,
                queued_for,
                worker_id,
            };

            let published = select! {
                send(self.results, result) -> sent => sent.is_ok(),
                recv(self.cancel.receiver()) -> _ => false,
            };
            if !published {
                self.counters.record_discarded(1);
                debug!(worker_id, item_id = %item_id, "Result dropped: pool cancelled before publish");
                break;
            }

            if panicked {
                // Fresh runtime after a panic unwound through block_on.
                match build_runtime() {
                    Ok(fresh) => rt = fresh,
                    Err(e) => {
                        error!(worker_id, error = %e, "Failed to rebuild worker runtime");
                        break;
                    }
                }
            }
        }

        debug!(worker_id, "Worker thread exiting");
    }
}

fn build_runtime() -> Result<Runtime, PoolError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| PoolError::Internal(format!("failed to create worker runtime: {e}")))
}

/// Spawn a worker thread with its own runtime.
fn spawn_worker<P, O, J>(worker: Worker<P, O, J>, stack_size: usize) -> Result<JoinHandle<()>, PoolError>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    J: JobProcessor<P, O>,
{
    let rt = build_runtime()?;
    thread::Builder::new()
        .name(format!("gp-worker-{}", worker.id))
        .stack_size(stack_size)
        .spawn(move || worker.run(rt))
        .map_err(|e| PoolError::Internal(format!("failed to spawn worker thread: {e}")))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
