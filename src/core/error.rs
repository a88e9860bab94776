//! Error types for pool and admission operations.

use thiserror::Error;

/// Errors produced by the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Shutdown has begun; the item was not enqueued.
    #[error("pool shutting down")]
    ShuttingDown,
    /// Configuration validation failed at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// `start` was called on a pool that is already running.
    #[error("pool already started")]
    AlreadyStarted,
    /// Internal failure (worker thread spawn, runtime construction).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors produced when constructing an admission controller.
#[derive(Debug, Error, PartialEq)]
pub enum AdmissionError {
    /// The steady-state rate was zero, negative or not finite.
    #[error("invalid admission rate: {0}")]
    InvalidRate(f64),
    /// The burst capacity was zero.
    #[error("admission capacity must be greater than 0")]
    InvalidCapacity,
}

impl From<AdmissionError> for PoolError {
    fn from(err: AdmissionError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Failure of a single work item, carried inside its result.
#[derive(Debug, Error)]
pub enum JobError {
    /// The processing function returned an error.
    #[error("job failed: {0}")]
    Failed(anyhow::Error),
    /// The processing function panicked; the worker survived.
    #[error("job panicked: {0}")]
    Panicked(String),
}

/// Application-facing result returned by processing functions.
pub type AppResult<T> = Result<T, anyhow::Error>;
