//! Configuration models for pools and admission control.

pub mod pool;

pub use pool::{
    AdmissionConfig, PoolsConfig, RefillStrategy, WorkerPoolConfig, MAX_TICKER_CAPACITY, MAX_TICKER_RATE,
};
