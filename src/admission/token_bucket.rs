//! Token bucket with lazy, time-derived refill.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::core::error::AdmissionError;
use crate::core::shutdown::ShutdownSignal;

/// Mutable bucket state. `tokens` and `last_refill` only change together
/// under the bucket mutex.
#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

impl BucketState {
    /// Credit whole elapsed intervals. `last_refill` advances by exactly the
    /// credited intervals so fractional progress toward the next token is kept.
    fn refill(&mut self, now: Instant, capacity: u32, interval: Duration) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let interval_nanos = interval.as_nanos().max(1);
        let intervals = elapsed.as_nanos() / interval_nanos;
        if intervals == 0 {
            return;
        }

        let added = u32::try_from(intervals).unwrap_or(u32::MAX);
        self.tokens = self.tokens.saturating_add(added).min(capacity);

        let remainder = elapsed.as_nanos() % interval_nanos;
        self.last_refill = now
            .checked_sub(nanos_to_duration(remainder))
            .unwrap_or(now);
    }

    /// Time until `n` tokens will be present.
    fn wait_for(&self, n: u32, now: Instant, interval: Duration) -> Duration {
        let missing = n.saturating_sub(self.tokens);
        let since_refill = now.saturating_duration_since(self.last_refill);
        interval
            .saturating_mul(missing)
            .saturating_sub(since_refill)
    }
}

fn nanos_to_duration(nanos: u128) -> Duration {
    let secs = u64::try_from(nanos / 1_000_000_000).unwrap_or(u64::MAX);
    #[allow(clippy::cast_possible_truncation)]
    let subsec = (nanos % 1_000_000_000) as u32;
    Duration::new(secs, subsec)
}

/// Token bucket admission controller.
///
/// Starts full. Each check first credits `floor(elapsed / interval)` tokens
/// (clamped to `capacity`), then grants or denies. Blocking waits sleep until
/// the next token is due and wake early when the shutdown signal fires.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
    shutdown: ShutdownSignal,
}

impl TokenBucket {
    /// Create a bucket refilling one token every `refill_interval`.
    ///
    /// # Errors
    ///
    /// `InvalidCapacity` for a zero capacity, `InvalidRate` for a zero interval.
    pub fn new(
        capacity: u32,
        refill_interval: Duration,
        shutdown: ShutdownSignal,
    ) -> Result<Self, AdmissionError> {
        if capacity == 0 {
            return Err(AdmissionError::InvalidCapacity);
        }
        if refill_interval.is_zero() {
            return Err(AdmissionError::InvalidRate(f64::INFINITY));
        }
        Ok(Self {
            capacity,
            refill_interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            shutdown,
        })
    }

    /// Create a bucket from a steady-state rate.
    ///
    /// # Errors
    ///
    /// `InvalidRate` when `rate_per_second` is zero, negative, not finite or
    /// so small that the refill interval is unrepresentable.
    pub fn with_rate(
        capacity: u32,
        rate_per_second: f64,
        shutdown: ShutdownSignal,
    ) -> Result<Self, AdmissionError> {
        if !rate_per_second.is_finite() || rate_per_second <= 0.0 {
            return Err(AdmissionError::InvalidRate(rate_per_second));
        }
        let interval = Duration::try_from_secs_f64(1.0 / rate_per_second)
            .map_err(|_| AdmissionError::InvalidRate(rate_per_second))?;
        Self::new(capacity, interval, shutdown)
    }

    /// Maximum burst size.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Time between single-token refills.
    #[must_use]
    pub const fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Tokens available right now.
    #[must_use]
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        state.refill(Instant::now(), self.capacity, self.refill_interval);
        state.tokens
    }

    /// Take one token, waiting for it if necessary.
    ///
    /// Returns `false` only when the shutdown signal fires (or has fired).
    pub fn allow(&self) -> bool {
        self.allow_n(1)
    }

    /// Take one token if one is available right now.
    pub fn try_allow(&self) -> bool {
        self.try_allow_n(1)
    }

    /// Take `n` tokens, waiting for them if necessary.
    ///
    /// A request larger than the capacity can never be met and returns
    /// `false` immediately.
    pub fn allow_n(&self, n: u32) -> bool {
        if n > self.capacity {
            return false;
        }
        loop {
            if self.shutdown.is_fired() {
                return false;
            }
            let wait = {
                let now = Instant::now();
                let mut state = self.state.lock();
                state.refill(now, self.capacity, self.refill_interval);
                if state.tokens >= n {
                    state.tokens -= n;
                    return true;
                }
                state.wait_for(n, now, self.refill_interval)
            };
            trace!(requested = n, wait_us = wait.as_micros(), "waiting for admission tokens");
            if self.shutdown.wait_timeout(wait) {
                return false;
            }
        }
    }

    /// Take `n` tokens if they are all available right now.
    pub fn try_allow_n(&self, n: u32) -> bool {
        if n > self.capacity {
            return false;
        }
        let mut state = self.state.lock();
        state.refill(Instant::now(), self.capacity, self.refill_interval);
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }
}
