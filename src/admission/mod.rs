//! Admission control: bounds how fast work may proceed.
//!
//! Two refill strategies implement the same contract:
//!
//! - [`TokenBucket`] derives tokens from elapsed time on every check.
//! - [`TickerBucket`] buffers tokens in a bounded channel fed by a ticker thread.
//!
//! Both expose a blocking `allow` that gives up only when the shared shutdown
//! signal fires, and a non-blocking `try_allow`.
//!
//! [`KeyedLimiter`] is a separate per-key fixed-window limiter for callers
//! that throttle individual clients.

pub mod keyed;
pub mod ticker;
pub mod token_bucket;

pub use keyed::KeyedLimiter;
pub use ticker::TickerBucket;
pub use token_bucket::TokenBucket;

use tracing::info;

use crate::config::{AdmissionConfig, RefillStrategy};
use crate::core::error::PoolError;
use crate::core::shutdown::{self, ShutdownSignal, ShutdownTrigger};

/// Admission controller shared by all workers of a pool.
#[derive(Debug)]
pub enum AdmissionController {
    /// No throttling; only the shutdown signal is observed.
    Unlimited(ShutdownSignal),
    /// Lazy time-math refill.
    Lazy(TokenBucket),
    /// Background ticker refill.
    Ticker(TickerBucket),
}

impl AdmissionController {
    /// Build a controller; `None` yields an unthrottled one.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a zero capacity or non-positive rate, `Internal`
    /// when a ticker thread cannot be spawned.
    pub fn new(config: Option<&AdmissionConfig>, shutdown: ShutdownSignal) -> Result<Self, PoolError> {
        let Some(config) = config else {
            return Ok(Self::Unlimited(shutdown));
        };
        config.validate().map_err(PoolError::InvalidConfig)?;

        let controller = match config.refill {
            RefillStrategy::Lazy => Self::Lazy(TokenBucket::with_rate(
                config.capacity,
                config.rate_per_second,
                shutdown,
            )?),
            RefillStrategy::Ticker => Self::Ticker(TickerBucket::with_rate(
                config.capacity,
                config.rate_per_second,
                shutdown,
            )?),
        };
        info!(
            capacity = config.capacity,
            rate_per_second = config.rate_per_second,
            refill = ?config.refill,
            "admission controller ready"
        );
        Ok(controller)
    }

    /// Wait for admission. Returns `false` only once shutdown has fired.
    pub fn allow(&self) -> bool {
        match self {
            Self::Unlimited(signal) => !signal.is_fired(),
            Self::Lazy(bucket) => bucket.allow(),
            Self::Ticker(bucket) => bucket.allow(),
        }
    }

    /// Admit only if a token is available right now.
    pub fn try_allow(&self) -> bool {
        match self {
            Self::Unlimited(_) => true,
            Self::Lazy(bucket) => bucket.try_allow(),
            Self::Ticker(bucket) => bucket.try_allow(),
        }
    }

    /// Tokens available right now; `None` when unthrottled.
    #[must_use]
    pub fn available(&self) -> Option<u32> {
        match self {
            Self::Unlimited(_) => None,
            Self::Lazy(bucket) => Some(bucket.available()),
            Self::Ticker(bucket) => Some(bucket.available()),
        }
    }

    /// Burst capacity; `None` when unthrottled.
    #[must_use]
    pub const fn capacity(&self) -> Option<u32> {
        match self {
            Self::Unlimited(_) => None,
            Self::Lazy(bucket) => Some(bucket.capacity()),
            Self::Ticker(bucket) => Some(bucket.capacity()),
        }
    }

    /// Release background resources. Call after the shutdown signal fired.
    pub fn close(&self) {
        if let Self::Ticker(bucket) = self {
            bucket.close();
        }
    }
}

/// An admission controller that owns its own shutdown trigger, for use
/// outside a pool.
#[derive(Debug)]
pub struct RateLimiter {
    controller: AdmissionController,
    trigger: ShutdownTrigger,
}

impl RateLimiter {
    /// Create a standalone limiter.
    ///
    /// # Errors
    ///
    /// See [`AdmissionController::new`].
    pub fn new(config: &AdmissionConfig) -> Result<Self, PoolError> {
        let (trigger, signal) = shutdown::channel();
        let controller = AdmissionController::new(Some(config), signal)?;
        Ok(Self { controller, trigger })
    }

    /// Wait for a token. Returns `false` once the limiter is stopped.
    pub fn allow(&self) -> bool {
        self.controller.allow()
    }

    /// Take a token only if one is available right now.
    pub fn try_allow(&self) -> bool {
        self.controller.try_allow()
    }

    /// Tokens available right now.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.controller.available().unwrap_or(u32::MAX)
    }

    /// Wake every blocked `allow` with `false` and stop background refill. Idempotent.
    pub fn stop(&self) {
        if self.trigger.fire() {
            info!("rate limiter stopped");
        }
        self.controller.close();
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.stop();
    }
}
