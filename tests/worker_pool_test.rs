//! Integration tests for WorkerPool
//!
//! These tests validate real-world functionality including:
//! - Exactly one result per submitted item
//! - Bounded concurrency and queue backpressure
//! - Processor errors and panics reported as results
//! - Async processors and non-serializable outputs (streaming pattern)

use async_trait::async_trait;
use gated_pool::config::{AdmissionConfig, WorkerPoolConfig};
use gated_pool::core::{
    AppResult, FnProcessor, ItemId, JobError, JobProcessor, JobResult, PoolState, WorkItem,
    WorkerPool,
};
use gated_pool::infra::TrySubmitError;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Drain results on a background thread until the sequence ends.
fn collect_in_background<P, O, J>(pool: &WorkerPool<P, O, J>) -> thread::JoinHandle<Vec<JobResult<P, O>>>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    J: JobProcessor<P, O>,
{
    let results = pool.results();
    thread::spawn(move || results.collect())
}

// ============================================================================
// TEST PROCESSORS
// ============================================================================

/// Sleeps on the worker's runtime, then reports the item id.
#[derive(Clone)]
struct SleepProcessor {
    delay: Duration,
}

#[async_trait]
impl JobProcessor<u64, String> for SleepProcessor {
    async fn process(&self, item: &WorkItem<u64>) -> AppResult<String> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("done:{}", item.id))
    }
}

/// Tracks how many items execute at once.
#[derive(Clone)]
struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

impl ConcurrencyProbe {
    fn new(delay: Duration) -> Self {
        Self {
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            delay,
        }
    }
}

#[async_trait]
impl JobProcessor<u64, u64> for ConcurrencyProbe {
    async fn process(&self, item: &WorkItem<u64>) -> AppResult<u64> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(item.payload)
    }
}

/// Returns a receiver that streams tokens, like an inference stream.
#[derive(Clone)]
struct StreamingProcessor;

#[async_trait]
impl JobProcessor<String, flume::Receiver<String>> for StreamingProcessor {
    async fn process(&self, item: &WorkItem<String>) -> AppResult<flume::Receiver<String>> {
        let (tx, rx) = flume::unbounded();
        for word in item.payload.split_whitespace() {
            tx.send(word.to_uppercase())?;
        }
        Ok(rx)
    }
}

// ============================================================================
// BASIC EXECUTION
// ============================================================================

#[test]
fn test_every_item_yields_one_result() {
    gated_pool::util::init_tracing();
    let pool = WorkerPool::new(
        WorkerPoolConfig::new().with_worker_count(3).with_queue_capacity(10),
        FnProcessor::new(|item: &WorkItem<()>| Ok(format!("done:{}", item.id))),
    )
    .unwrap();
    pool.start().unwrap();

    let consumer = collect_in_background(&pool);
    for id in 1..=10_u64 {
        pool.submit(WorkItem::new(id, ())).unwrap();
    }
    pool.drain();

    let results = consumer.join().unwrap();
    assert_eq!(results.len(), 10);

    let outputs: Vec<String> = results
        .iter()
        .filter_map(|r| r.output().cloned())
        .collect();
    let distinct: HashSet<String> = outputs.iter().cloned().collect();
    let expected: HashSet<String> = (1..=10).map(|id| format!("done:{id}")).collect();
    assert_eq!(outputs.len(), 10, "no repeats");
    assert_eq!(distinct, expected);

    let stats = pool.stats();
    assert_eq!(stats.submitted, 10);
    assert_eq!(stats.completed, 10);
    assert_eq!(stats.discarded, 0);
    assert_eq!(pool.state(), PoolState::Stopped);
}

#[test]
fn test_throttled_pool_yields_one_result_per_item() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new()
            .with_worker_count(3)
            .with_queue_capacity(10)
            .with_admission(AdmissionConfig::new(5, 5.0)),
        FnProcessor::new(|item: &WorkItem<()>| Ok(format!("done:{}", item.id))),
    )
    .unwrap();
    pool.start().unwrap();

    let consumer = collect_in_background(&pool);
    for id in 1..=8_u64 {
        pool.submit(WorkItem::new(id, ())).unwrap();
    }
    pool.drain();

    let outputs: HashSet<String> = consumer
        .join()
        .unwrap()
        .iter()
        .filter_map(|r| r.output().cloned())
        .collect();
    let expected: HashSet<String> = (1..=8).map(|id| format!("done:{id}")).collect();
    assert_eq!(outputs, expected);
}

#[test]
fn test_async_processor_on_worker_runtime() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new().with_worker_count(2).with_queue_capacity(4),
        SleepProcessor {
            delay: Duration::from_millis(10),
        },
    )
    .unwrap();
    pool.start().unwrap();

    let id = pool.submit_payload(99).unwrap();
    let result = pool.results().recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(result.item.id, id);
    assert_eq!(result.output().map(String::as_str), Some("done:1"));
    assert!(result.duration >= Duration::from_millis(10));
    assert!(result.worker_id < 2);

    pool.stop();
}

#[test]
fn test_results_carry_random_delays() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new().with_worker_count(4).with_queue_capacity(8),
        FnProcessor::new(|item: &WorkItem<u64>| {
            thread::sleep(Duration::from_millis(item.payload));
            Ok(item.payload)
        }),
    )
    .unwrap();
    pool.start().unwrap();

    let consumer = collect_in_background(&pool);
    let mut rng = rand::rng();
    let mut expected = HashSet::new();
    for id in 1..=24_u64 {
        let delay = rng.random_range(1..15);
        expected.insert(ItemId(id));
        pool.submit(WorkItem::new(id, delay)).unwrap();
    }
    pool.drain();

    let results = consumer.join().unwrap();
    let ids: HashSet<ItemId> = results.iter().map(|r| r.item.id).collect();
    assert_eq!(results.len(), 24);
    assert_eq!(ids, expected);
    for result in &results {
        assert_eq!(result.output(), Some(&result.item.payload));
    }
}

// ============================================================================
// CONCURRENCY AND BACKPRESSURE
// ============================================================================

#[test]
fn test_concurrency_bounded_by_worker_count() {
    let probe = ConcurrencyProbe::new(Duration::from_millis(50));
    let peak = Arc::clone(&probe.peak);
    let pool = WorkerPool::new(
        WorkerPoolConfig::new().with_worker_count(4).with_queue_capacity(16),
        probe,
    )
    .unwrap();
    pool.start().unwrap();

    let consumer = collect_in_background(&pool);
    let start = Instant::now();
    for id in 1..=12_u64 {
        pool.submit(WorkItem::new(id, id)).unwrap();
    }
    pool.drain();
    let elapsed = start.elapsed();

    assert_eq!(consumer.join().unwrap().len(), 12);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak concurrency {peak} exceeded worker count");
    assert!(peak >= 2, "items should overlap, peak was {peak}");
    // ceil(12 / 4) rounds of 50ms
    assert!(elapsed >= Duration::from_millis(140), "finished too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "finished too slow: {elapsed:?}");
}

#[test]
fn test_try_submit_reports_full_queue() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new().with_worker_count(1).with_queue_capacity(2),
        FnProcessor::new(|_: &WorkItem<u8>| Ok(())),
    )
    .unwrap();

    // Not started: nothing drains the queue.
    pool.try_submit(WorkItem::new(1_u64, 1)).unwrap();
    pool.try_submit(WorkItem::new(2_u64, 2)).unwrap();
    match pool.try_submit(WorkItem::new(3_u64, 3)) {
        Err(TrySubmitError::Full(item)) => assert_eq!(item.payload, 3),
        other => panic!("expected Full, got {other:?}"),
    }
    assert_eq!(pool.stats().submitted, 2);
    assert_eq!(pool.stats().queued, 2);

    pool.start().unwrap();
    let consumer = collect_in_background(&pool);
    pool.drain();
    assert_eq!(consumer.join().unwrap().len(), 2);
}

#[test]
fn test_submit_blocks_until_space() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new().with_worker_count(1).with_queue_capacity(1),
        SleepProcessor {
            delay: Duration::from_millis(60),
        },
    )
    .unwrap();
    pool.start().unwrap();
    let consumer = collect_in_background(&pool);

    let start = Instant::now();
    for id in 1..=3_u64 {
        pool.submit(WorkItem::new(id, id)).unwrap();
    }
    // The third submit had to wait for the worker to free a queue slot.
    assert!(start.elapsed() >= Duration::from_millis(40));

    pool.drain();
    assert_eq!(consumer.join().unwrap().len(), 3);
}

#[test]
fn test_blocked_submitter_not_counted_until_enqueued() {
    let pool = Arc::new(
        WorkerPool::new(
            WorkerPoolConfig::new()
                .with_worker_count(1)
                .with_queue_capacity(1)
                .with_result_capacity(4),
            FnProcessor::new(|item: &WorkItem<u64>| Ok(item.payload)),
        )
        .unwrap(),
    );
    pool.submit(WorkItem::new(1_u64, 1)).unwrap();

    let blocked = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.submit(WorkItem::new(2_u64, 2)))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!blocked.is_finished());
    let stats = pool.stats();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.queued, 1);

    // Starting frees the slot the submitter is waiting for.
    pool.start().unwrap();
    let results = pool.results();
    blocked.join().unwrap().unwrap();
    assert_eq!(pool.stats().submitted, 2);

    pool.drain();
    assert_eq!(results.count(), 2);
    let stats = pool.stats();
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.completed, 2);
}

#[test]
fn test_admission_throttles_execution() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new()
            .with_worker_count(2)
            .with_queue_capacity(8)
            .with_admission(AdmissionConfig::new(2, 10.0)),
        FnProcessor::new(|item: &WorkItem<u64>| Ok(item.payload)),
    )
    .unwrap();
    pool.start().unwrap();

    let consumer = collect_in_background(&pool);
    let start = Instant::now();
    for id in 1..=6_u64 {
        pool.submit(WorkItem::new(id, id)).unwrap();
    }
    pool.drain();
    let elapsed = start.elapsed();

    assert_eq!(consumer.join().unwrap().len(), 6);
    // Two burst tokens, then four refills at 100ms each.
    assert!(elapsed >= Duration::from_millis(350), "admission not enforced: {elapsed:?}");
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn test_processor_errors_are_results() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new().with_worker_count(2).with_queue_capacity(8),
        FnProcessor::new(|item: &WorkItem<u32>| {
            if item.payload % 2 == 1 {
                anyhow::bail!("odd payload {}", item.payload);
            }
            Ok(item.payload / 2)
        }),
    )
    .unwrap();
    pool.start().unwrap();

    let consumer = collect_in_background(&pool);
    for id in 0..6_u64 {
        pool.submit(WorkItem::new(id, u32::try_from(id).unwrap())).unwrap();
    }
    pool.drain();

    let results = consumer.join().unwrap();
    assert_eq!(results.len(), 6);
    for result in &results {
        if result.item.payload % 2 == 1 {
            match result.error() {
                Some(JobError::Failed(err)) => {
                    assert_eq!(err.to_string(), format!("odd payload {}", result.item.payload));
                }
                other => panic!("expected failure, got {other:?}"),
            }
        } else {
            assert_eq!(result.output(), Some(&(result.item.payload / 2)));
        }
    }
    let stats = pool.stats();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.failed, 3);
}

#[test]
fn test_panicking_processor_does_not_kill_pool() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new().with_worker_count(1).with_queue_capacity(8),
        FnProcessor::new(|item: &WorkItem<u32>| {
            if item.payload == 0 {
                panic!("division by zero requested");
            }
            Ok(100 / item.payload)
        }),
    )
    .unwrap();
    pool.start().unwrap();

    let consumer = collect_in_background(&pool);
    for (id, payload) in [(1_u64, 5), (2, 0), (3, 20), (4, 0), (5, 50)] {
        pool.submit(WorkItem::new(id, payload)).unwrap();
    }
    pool.drain();

    let results = consumer.join().unwrap();
    assert_eq!(results.len(), 5);
    let panicked = results
        .iter()
        .filter(|r| matches!(r.error(), Some(JobError::Panicked(msg)) if msg.contains("division by zero")))
        .count();
    assert_eq!(panicked, 2);
    assert_eq!(pool.stats().completed, 3);
    assert_eq!(pool.stats().panicked, 2);
}

// ============================================================================
// NON-SERIALIZABLE OUTPUTS
// ============================================================================

#[test]
fn test_streaming_receiver_output() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new().with_worker_count(2).with_queue_capacity(4),
        StreamingProcessor,
    )
    .unwrap();
    pool.start().unwrap();

    pool.submit(WorkItem::new(1_u64, "hello from the pool".to_string()))
        .unwrap();
    let result = pool.results().recv_timeout(Duration::from_secs(5)).unwrap();
    let stream = result.outcome.unwrap();
    let tokens: Vec<String> = stream.try_iter().collect();
    assert_eq!(tokens, vec!["HELLO", "FROM", "THE", "POOL"]);

    pool.stop();
}
