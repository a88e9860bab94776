//! Pool and admission configuration structures.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bound on queued work items.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Default stack size for worker threads (2 MiB).
pub const DEFAULT_THREAD_STACK_SIZE: usize = 2 * 1024 * 1024;
/// Largest burst the ticker strategy accepts; its token buffer is allocated up front.
pub const MAX_TICKER_CAPACITY: u32 = 65_536;
/// Highest rate the ticker strategy accepts (one tick per millisecond).
pub const MAX_TICKER_RATE: f64 = 1000.0;

/// How an admission controller replenishes its tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefillStrategy {
    /// Tokens are recomputed from elapsed time whenever the bucket is checked.
    #[default]
    Lazy,
    /// A background task adds one token per interval to a bounded buffer.
    Ticker,
}

impl FromStr for RefillStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lazy" => Ok(Self::Lazy),
            "ticker" => Ok(Self::Ticker),
            other => Err(format!("unknown refill strategy `{other}`")),
        }
    }
}

/// Token-bucket admission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum burst size; also the number of tokens available at start.
    pub capacity: u32,
    /// Steady-state admissions per second.
    pub rate_per_second: f64,
    /// Refill strategy.
    #[serde(default)]
    pub refill: RefillStrategy,
}

impl AdmissionConfig {
    /// Create an admission config with the lazy refill strategy.
    #[must_use]
    pub const fn new(capacity: u32, rate_per_second: f64) -> Self {
        Self {
            capacity,
            rate_per_second,
            refill: RefillStrategy::Lazy,
        }
    }

    /// Select the refill strategy.
    #[must_use]
    pub const fn with_refill(mut self, refill: RefillStrategy) -> Self {
        self.refill = refill;
        self
    }

    /// Time between single-token refills, or `None` when the rate is not a
    /// positive number or the interval does not fit in a `Duration`.
    #[must_use]
    pub fn refill_interval(&self) -> Option<Duration> {
        if !self.rate_per_second.is_finite() || self.rate_per_second <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / self.rate_per_second).ok()
    }

    /// Validate admission values.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("admission capacity must be greater than 0".into());
        }
        if !self.rate_per_second.is_finite() || self.rate_per_second <= 0.0 {
            return Err(format!(
                "rate_per_second must be a positive number, got {}",
                self.rate_per_second
            ));
        }
        if self.refill_interval().is_none() {
            return Err(format!(
                "rate_per_second {} is too small to schedule refills",
                self.rate_per_second
            ));
        }
        if self.refill == RefillStrategy::Ticker {
            if self.capacity > MAX_TICKER_CAPACITY {
                return Err(format!(
                    "ticker capacity must be at most {MAX_TICKER_CAPACITY}, got {}",
                    self.capacity
                ));
            }
            if self.rate_per_second > MAX_TICKER_RATE {
                return Err(format!(
                    "ticker rate_per_second must be at most {MAX_TICKER_RATE}, got {}",
                    self.rate_per_second
                ));
            }
        }
        Ok(())
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Maximum queued items before `submit` blocks.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Maximum undrained results before workers block on publish.
    #[serde(default)]
    pub result_capacity: Option<usize>,
    /// Stack size for each worker thread.
    #[serde(default = "default_thread_stack_size")]
    pub thread_stack_size: usize,
    /// Admission control; `None` runs unthrottled.
    #[serde(default)]
    pub admission: Option<AdmissionConfig>,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

const fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

const fn default_thread_stack_size() -> usize {
    DEFAULT_THREAD_STACK_SIZE
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPoolConfig {
    /// Configuration with one worker per CPU, a 1024-slot queue and no admission limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            result_capacity: None,
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
            admission: None,
        }
    }

    /// Set the number of workers.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the work queue bound.
    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the result channel bound.
    #[must_use]
    pub const fn with_result_capacity(mut self, result_capacity: usize) -> Self {
        self.result_capacity = Some(result_capacity);
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Throttle execution with a token bucket.
    #[must_use]
    pub const fn with_admission(mut self, admission: AdmissionConfig) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Effective result channel bound (defaults to the queue bound).
    #[must_use]
    pub fn effective_result_capacity(&self) -> usize {
        self.result_capacity.unwrap_or(self.queue_capacity)
    }

    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".into());
        }
        if self.effective_result_capacity() == 0 {
            return Err("result_capacity must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        if let Some(admission) = &self.admission {
            admission.validate()?;
        }
        Ok(())
    }

    /// Build a configuration from `GATED_POOL_*` environment variables,
    /// loading a `.env` file first when one exists.
    ///
    /// Unset variables keep their defaults. Admission is enabled when
    /// `GATED_POOL_RATE_PER_SEC` is set; the burst defaults to the rate
    /// rounded up.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::new();
        if let Some(workers) = env_var::<usize>("GATED_POOL_WORKERS")? {
            cfg.worker_count = workers;
        }
        if let Some(capacity) = env_var::<usize>("GATED_POOL_QUEUE_CAPACITY")? {
            cfg.queue_capacity = capacity;
        }
        if let Some(capacity) = env_var::<usize>("GATED_POOL_RESULT_CAPACITY")? {
            cfg.result_capacity = Some(capacity);
        }
        if let Some(rate) = env_var::<f64>("GATED_POOL_RATE_PER_SEC")? {
            let burst = env_var::<u32>("GATED_POOL_BURST")?.unwrap_or_else(|| burst_for_rate(rate));
            let refill = env_var::<RefillStrategy>("GATED_POOL_REFILL")?.unwrap_or_default();
            cfg.admission = Some(AdmissionConfig::new(burst, rate).with_refill(refill));
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn burst_for_rate(rate: f64) -> u32 {
    rate.ceil().clamp(1.0, f64::from(u32::MAX)) as u32
}

fn env_var<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("{name}: invalid value `{raw}`: {e}")),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(format!("{name}: {e}")),
    }
}

/// Root configuration holding several named pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolsConfig {
    /// Map of pool name to configuration.
    pub pools: HashMap<String, WorkerPoolConfig>,
}

impl PoolsConfig {
    /// Validate all pools and ensure at least one pool exists.
    pub fn validate(&self) -> Result<(), String> {
        if self.pools.is_empty() {
            return Err("at least one pool must be defined".into());
        }
        for (name, pool) in &self.pools {
            pool.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
