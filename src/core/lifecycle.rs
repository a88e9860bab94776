//! Pool state machine and shutdown signals.
//!
//! ```text
//! Created --start--> Running --stop/drain--> Draining --workers joined--> Stopped
//! ```
//!
//! The lifecycle owns both shutdown triggers. Only the pool's shutdown path
//! fires them, so each terminal transition happens exactly once.

use std::fmt;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use super::error::PoolError;
use super::shutdown::{self, ShutdownSignal, ShutdownTrigger};

/// Observable pool state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Constructed; submissions buffer in the queue until `start`.
    Created,
    /// Workers are running.
    Running,
    /// No new work is accepted; in-flight work is finishing.
    Draining,
    /// All workers exited and the result channel is closed.
    Stopped,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How in-flight and queued work is treated at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Cancel first: workers stop claiming items, queued items are discarded.
    Cancel,
    /// Close intake first: workers finish every queued item before exiting.
    Drain,
}

#[derive(Debug)]
struct Inner {
    state: PoolState,
    shutdown_claimed: bool,
}

/// Single owner of pool state and of the cancellation/closing triggers.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    inner: Mutex<Inner>,
    stopped: Condvar,
    cancel: ShutdownTrigger,
    cancel_signal: ShutdownSignal,
    closing: ShutdownTrigger,
    closing_signal: ShutdownSignal,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (cancel, cancel_signal) = shutdown::channel();
        let (closing, closing_signal) = shutdown::channel();
        Self {
            inner: Mutex::new(Inner {
                state: PoolState::Created,
                shutdown_claimed: false,
            }),
            stopped: Condvar::new(),
            cancel,
            cancel_signal,
            closing,
            closing_signal,
        }
    }

    pub fn state(&self) -> PoolState {
        self.inner.lock().state
    }

    /// Signal observed by every blocking worker operation.
    pub fn cancel_signal(&self) -> ShutdownSignal {
        self.cancel_signal.clone()
    }

    /// Signal observed by blocked submitters.
    pub const fn closing_signal(&self) -> &ShutdownSignal {
        &self.closing_signal
    }

    /// `Created -> Running`.
    pub fn begin_start(&self) -> Result<(), PoolError> {
        let mut inner = self.inner.lock();
        if inner.shutdown_claimed {
            return Err(PoolError::ShuttingDown);
        }
        match inner.state {
            PoolState::Created => {
                inner.state = PoolState::Running;
                Ok(())
            }
            PoolState::Running => Err(PoolError::AlreadyStarted),
            PoolState::Draining | PoolState::Stopped => Err(PoolError::ShuttingDown),
        }
    }

    /// Claim the shutdown path. Returns `true` for the one caller that must
    /// run the protocol; any other caller waits here until `Stopped`.
    pub fn claim_shutdown(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.shutdown_claimed {
            inner.shutdown_claimed = true;
            return true;
        }
        while inner.state != PoolState::Stopped {
            self.stopped.wait(&mut inner);
        }
        false
    }

    /// Fire the signal that wakes blocked submitters.
    pub fn close_intake(&self) -> bool {
        self.closing.fire()
    }

    /// Fire the cancellation signal.
    pub fn cancel(&self) -> bool {
        self.cancel.fire()
    }

    /// Record that intake is closed.
    pub fn enter_draining(&self) {
        self.inner.lock().state = PoolState::Draining;
    }

    /// Record that shutdown finished and wake racing `claim_shutdown` callers.
    pub fn finish(&self) {
        self.inner.lock().state = PoolState::Stopped;
        self.stopped.notify_all();
    }

    /// Whether a shutdown path has been claimed.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.lock().shutdown_claimed
    }
}
