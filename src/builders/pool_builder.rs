//! Builders to construct worker pools from configuration.

use std::collections::HashMap;

use tracing::info;

use crate::config::{PoolsConfig, WorkerPoolConfig};
use crate::core::{JobProcessor, PoolError, WorkerPool};

/// Build one `WorkerPool` per configured name using the provided processor factory.
///
/// Pools are returned in the `Created` state; callers start them.
///
/// # Errors
///
/// `PoolError::InvalidConfig` if the configuration fails validation, or
/// whatever the factory or pool construction returns. Pools built before
/// the failure are dropped.
pub fn build_pools<P, O, J, F>(
    cfg: &PoolsConfig,
    mut processor_factory: F,
) -> Result<HashMap<String, WorkerPool<P, O, J>>, PoolError>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    J: JobProcessor<P, O>,
    F: FnMut(&str, &WorkerPoolConfig) -> Result<J, PoolError>,
{
    cfg.validate()
        .map_err(|e| PoolError::InvalidConfig(format!("config invalid: {e}")))?;

    let mut pools = HashMap::with_capacity(cfg.pools.len());
    for (name, pool_cfg) in &cfg.pools {
        let processor = processor_factory(name, pool_cfg)?;
        let pool = WorkerPool::new(pool_cfg.clone(), processor)?;
        info!(pool = %name, pool_id = %pool.pool_id(), "built pool from configuration");
        pools.insert(name.clone(), pool);
    }

    Ok(pools)
}
