//! Per-key fixed-window limiter with an owned sweep task.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::core::error::PoolError;
use crate::core::shutdown::{self, ShutdownTrigger};

#[derive(Debug, Clone, Copy)]
struct Visitor {
    last_seen: Instant,
    count: u32,
}

#[derive(Debug)]
struct KeyedState<K> {
    visitors: RwLock<HashMap<K, Visitor>>,
    limit: u32,
    window: Duration,
}

impl<K: Eq + Hash> KeyedState<K> {
    fn check(&self, key: &K, now: Instant) -> bool
    where
        K: Clone,
    {
        let mut visitors = self.visitors.write();
        let Some(visitor) = visitors.get_mut(key) else {
            visitors.insert(
                key.clone(),
                Visitor {
                    last_seen: now,
                    count: 1,
                },
            );
            return true;
        };

        if now.saturating_duration_since(visitor.last_seen) > self.window {
            visitor.count = 1;
            visitor.last_seen = now;
            return true;
        }
        if visitor.count >= self.limit {
            return false;
        }
        visitor.count += 1;
        visitor.last_seen = now;
        true
    }

    fn sweep(&self, now: Instant) -> usize {
        let mut visitors = self.visitors.write();
        let before = visitors.len();
        visitors.retain(|_, v| now.saturating_duration_since(v.last_seen) <= self.window);
        before - visitors.len()
    }
}

/// Limits each key to `limit` requests per `window`.
///
/// A key idle for longer than `window` starts a fresh window. Idle keys are
/// evicted by a sweep thread owned by the limiter; [`KeyedLimiter::stop`]
/// (or dropping the limiter) terminates and joins it.
pub struct KeyedLimiter<K> {
    state: Arc<KeyedState<K>>,
    trigger: ShutdownTrigger,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<K> KeyedLimiter<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Create a limiter that sweeps idle keys once per `window`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a zero limit or window, `Internal` when the sweep
    /// thread cannot be spawned.
    pub fn new(limit: u32, window: Duration) -> Result<Self, PoolError> {
        Self::with_sweep_interval(limit, window, window)
    }

    /// Create a limiter with an explicit sweep period.
    ///
    /// # Errors
    ///
    /// See [`KeyedLimiter::new`].
    pub fn with_sweep_interval(
        limit: u32,
        window: Duration,
        sweep_every: Duration,
    ) -> Result<Self, PoolError> {
        if limit == 0 {
            return Err(PoolError::InvalidConfig("limit must be greater than 0".into()));
        }
        if window.is_zero() || sweep_every.is_zero() {
            return Err(PoolError::InvalidConfig(
                "window and sweep interval must be greater than 0".into(),
            ));
        }

        let state = Arc::new(KeyedState {
            visitors: RwLock::new(HashMap::new()),
            limit,
            window,
        });
        let (trigger, signal) = shutdown::channel();

        let sweeper = {
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name("gp-sweep".into())
                .spawn(move || {
                    let ticker = tick(sweep_every);
                    loop {
                        select! {
                            recv(ticker) -> _ => {
                                let removed = state.sweep(Instant::now());
                                if removed > 0 {
                                    debug!(removed, "swept idle limiter keys");
                                }
                            }
                            recv(signal.receiver()) -> _ => break,
                        }
                    }
                    debug!("limiter sweep thread exiting");
                })
                .map_err(|e| PoolError::Internal(format!("failed to spawn sweep thread: {e}")))?
        };

        Ok(Self {
            state,
            trigger,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Record a request for `key`. Returns `false` when the key is over its limit.
    pub fn check(&self, key: &K) -> bool {
        self.state.check(key, Instant::now())
    }

    /// Evict keys idle for longer than the window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.state.sweep(Instant::now())
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.visitors.read().len()
    }

    /// Whether no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the sweep thread and wait for it. Idempotent.
    pub fn stop(&self) {
        self.trigger.fire();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("limiter sweep thread panicked");
            }
        }
    }
}

impl<K> Drop for KeyedLimiter<K> {
    fn drop(&mut self) {
        self.trigger.fire();
        if let Some(handle) = self.sweeper.lock().take() {
            let _ = handle.join();
        }
    }
}
