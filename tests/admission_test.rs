//! Integration tests for admission control
//!
//! Timing-based checks of burst capacity and steady-state refill for both
//! refill strategies, shutdown wake-ups, and the keyed limiter.

use gated_pool::admission::{KeyedLimiter, RateLimiter, TokenBucket};
use gated_pool::config::{AdmissionConfig, RefillStrategy};
use gated_pool::core::shutdown;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn assert_burst_then_refill(limiter: &RateLimiter) {
    let start = Instant::now();
    for _ in 0..5 {
        assert!(limiter.allow());
    }
    assert!(
        start.elapsed() < Duration::from_millis(50),
        "burst took {:?}",
        start.elapsed()
    );

    let before_sixth = Instant::now();
    assert!(limiter.allow());
    let waited = before_sixth.elapsed();
    assert!(waited >= Duration::from_millis(150), "sixth admitted after {waited:?}");
    assert!(waited < Duration::from_millis(600), "sixth admitted after {waited:?}");
}

#[test]
fn test_lazy_burst_then_steady_rate() {
    let limiter = RateLimiter::new(&AdmissionConfig::new(5, 5.0)).unwrap();
    assert_eq!(limiter.available(), 5);
    assert_burst_then_refill(&limiter);
}

#[test]
fn test_ticker_burst_then_steady_rate() {
    let limiter =
        RateLimiter::new(&AdmissionConfig::new(5, 5.0).with_refill(RefillStrategy::Ticker)).unwrap();
    assert_burst_then_refill(&limiter);
    limiter.stop();
}

fn concurrent_try_allow(limiter: &Arc<RateLimiter>, callers: usize) -> usize {
    let granted = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let limiter = Arc::clone(limiter);
            let granted = Arc::clone(&granted);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                if limiter.try_allow() {
                    granted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    granted.load(Ordering::SeqCst)
}

#[test]
fn test_concurrent_try_allow_never_over_admits() {
    for refill in [RefillStrategy::Lazy, RefillStrategy::Ticker] {
        let limiter =
            Arc::new(RateLimiter::new(&AdmissionConfig::new(8, 0.5).with_refill(refill)).unwrap());
        assert_eq!(concurrent_try_allow(&limiter, 9), 8, "{refill:?}");
        assert!(!limiter.try_allow());
    }
}

#[test]
fn test_stop_wakes_blocked_allow() {
    let limiter = Arc::new(RateLimiter::new(&AdmissionConfig::new(1, 0.1)).unwrap());
    assert!(limiter.allow());

    let waiter = {
        let limiter = Arc::clone(&limiter);
        thread::spawn(move || {
            let start = Instant::now();
            (limiter.allow(), start.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(50));
    limiter.stop();

    let (admitted, waited) = waiter.join().unwrap();
    assert!(!admitted);
    assert!(waited < Duration::from_secs(2));
    assert!(!limiter.allow());
}

#[test]
fn test_ticker_stop_wakes_blocked_allow() {
    let limiter = Arc::new(
        RateLimiter::new(&AdmissionConfig::new(1, 0.1).with_refill(RefillStrategy::Ticker)).unwrap(),
    );
    assert!(limiter.try_allow());

    let waiter = {
        let limiter = Arc::clone(&limiter);
        thread::spawn(move || limiter.allow())
    };
    thread::sleep(Duration::from_millis(50));
    limiter.stop();
    assert!(!waiter.join().unwrap());
}

#[test]
fn test_token_bucket_allow_n() {
    let (trigger, signal) = shutdown::channel();
    let bucket = TokenBucket::with_rate(4, 20.0, signal).unwrap();

    assert!(bucket.try_allow_n(3));
    assert!(!bucket.try_allow_n(2));
    assert!(!bucket.allow_n(5), "requests above capacity never succeed");

    let start = Instant::now();
    assert!(bucket.allow_n(2));
    // One token left, one more needed at 50ms per token.
    assert!(start.elapsed() >= Duration::from_millis(30));

    trigger.fire();
    assert!(!bucket.allow());
}

#[test]
fn test_tokens_never_exceed_capacity() {
    let (_trigger, signal) = shutdown::channel();
    let bucket = TokenBucket::with_rate(3, 100.0, signal).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(bucket.available(), 3);
}

#[test]
fn test_keyed_limiter_windows() {
    let limiter = KeyedLimiter::new(2, Duration::from_millis(100)).unwrap();
    assert!(limiter.check(&"10.0.0.1"));
    assert!(limiter.check(&"10.0.0.1"));
    assert!(!limiter.check(&"10.0.0.1"));
    assert!(limiter.check(&"10.0.0.2"));
    assert_eq!(limiter.len(), 2);

    thread::sleep(Duration::from_millis(120));
    assert!(limiter.check(&"10.0.0.1"));

    limiter.stop();
    limiter.stop();
}

#[test]
fn test_keyed_limiter_sweeps_idle_keys() {
    let limiter =
        KeyedLimiter::with_sweep_interval(1, Duration::from_millis(20), Duration::from_millis(10))
            .unwrap();
    assert!(limiter.check(&42_u64));
    thread::sleep(Duration::from_millis(150));
    assert!(limiter.is_empty());
}
