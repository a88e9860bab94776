//! Token bucket refilled by a background ticker thread.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::pool::{MAX_TICKER_CAPACITY, MAX_TICKER_RATE};
use crate::core::error::{AdmissionError, PoolError};
use crate::core::shutdown::ShutdownSignal;

/// Token bucket whose tokens live in a bounded channel.
///
/// The channel starts full. A refill thread pushes one token per tick; when
/// the channel is already full the tick is dropped, so tokens never exceed
/// capacity and missed ticks are not banked. The refill thread exits when the
/// shutdown signal fires and is joined by [`TickerBucket::close`].
#[derive(Debug)]
pub struct TickerBucket {
    capacity: u32,
    refill_interval: Duration,
    tokens: Receiver<()>,
    shutdown: ShutdownSignal,
    refill: Mutex<Option<JoinHandle<()>>>,
}

impl TickerBucket {
    /// Create the bucket and start its refill thread.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a zero capacity or interval, `Internal` when the
    /// refill thread cannot be spawned.
    pub fn new(
        capacity: u32,
        refill_interval: Duration,
        shutdown: ShutdownSignal,
    ) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(AdmissionError::InvalidCapacity.into());
        }
        if refill_interval.is_zero() {
            return Err(AdmissionError::InvalidRate(f64::INFINITY).into());
        }
        if capacity > MAX_TICKER_CAPACITY {
            return Err(PoolError::InvalidConfig(format!(
                "ticker capacity must be at most {MAX_TICKER_CAPACITY}, got {capacity}"
            )));
        }
        if refill_interval < Duration::from_secs_f64(1.0 / MAX_TICKER_RATE) {
            return Err(PoolError::InvalidConfig(format!(
                "ticker refill interval must be at least {:?}",
                Duration::from_secs_f64(1.0 / MAX_TICKER_RATE)
            )));
        }

        let slots = usize::try_from(capacity)
            .map_err(|e| PoolError::InvalidConfig(format!("capacity: {e}")))?;
        let (tx, rx) = bounded::<()>(slots);
        for _ in 0..capacity {
            let _ = tx.try_send(());
        }

        let handle = spawn_refill(tx, refill_interval, shutdown.clone())?;
        debug!(capacity, interval_ms = refill_interval.as_millis(), "ticker bucket started");

        Ok(Self {
            capacity,
            refill_interval,
            tokens: rx,
            shutdown,
            refill: Mutex::new(Some(handle)),
        })
    }

    /// Create the bucket from a steady-state rate.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the rate is not a positive finite number.
    pub fn with_rate(
        capacity: u32,
        rate_per_second: f64,
        shutdown: ShutdownSignal,
    ) -> Result<Self, PoolError> {
        if !rate_per_second.is_finite() || rate_per_second <= 0.0 {
            return Err(AdmissionError::InvalidRate(rate_per_second).into());
        }
        let interval = Duration::try_from_secs_f64(1.0 / rate_per_second)
            .map_err(|_| PoolError::from(AdmissionError::InvalidRate(rate_per_second)))?;
        Self::new(capacity, interval, shutdown)
    }

    /// Maximum burst size.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Time between refill ticks.
    #[must_use]
    pub const fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Tokens buffered right now.
    #[must_use]
    pub fn available(&self) -> u32 {
        u32::try_from(self.tokens.len()).unwrap_or(u32::MAX)
    }

    /// Take one token, waiting for the next tick if necessary.
    ///
    /// Returns `false` only when the shutdown signal fires (or has fired).
    pub fn allow(&self) -> bool {
        if self.shutdown.is_fired() {
            return false;
        }
        select! {
            recv(self.tokens) -> token => token.is_ok(),
            recv(self.shutdown.receiver()) -> _ => false,
        }
    }

    /// Take one token if one is buffered right now.
    pub fn try_allow(&self) -> bool {
        self.tokens.try_recv().is_ok()
    }

    /// Join the refill thread. Must follow the shutdown signal; before it
    /// fires this is a no-op so the caller cannot hang on a live ticker.
    pub fn close(&self) {
        if !self.shutdown.is_fired() {
            warn!("ticker bucket close requested before shutdown signal; refill thread left running");
            return;
        }
        let handle = self.refill.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("ticker refill thread panicked");
            }
        }
    }
}

fn spawn_refill(
    tx: Sender<()>,
    interval: Duration,
    shutdown: ShutdownSignal,
) -> Result<JoinHandle<()>, PoolError> {
    thread::Builder::new()
        .name("gp-refill".into())
        .spawn(move || {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        // Full bucket: the tick is dropped.
                        let _ = tx.try_send(());
                    }
                    recv(shutdown.receiver()) -> _ => break,
                }
            }
            debug!("ticker refill thread exiting");
        })
        .map_err(|e| PoolError::Internal(format!("failed to spawn refill thread: {e}")))
}
