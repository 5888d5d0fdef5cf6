//! Redis connection pool management

use deadpool_redis::{Config as DeadpoolConfig, Pool, Runtime};
use std::time::Duration;

use crate::{config::RedisConfig, error::Result};

pub(crate) async fn create_pool(config: &RedisConfig) -> Result<Pool> {
    create_pool_with_retries(config, config.max_retries).await
}

async fn create_pool_with_retries(config: &RedisConfig, max_retries: u32) -> Result<Pool> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!("redis connection established after {} attempt(s)", attempt + 1);
                } else {
                    tracing::info!(max_connections = config.max_connections, "redis connection pool created");
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;
                if attempt > max_retries {
                    tracing::error!("failed to connect to redis after {} attempts: {}", max_retries + 1, e);
                    return Err(e);
                }

                let delay = base_delay * 2_u32.pow(attempt.saturating_sub(1));
                tracing::warn!("redis connection attempt {} failed: {}. retrying in {:?}...", attempt, e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn try_create_pool(config: &RedisConfig) -> Result<Pool> {
    let cfg = DeadpoolConfig::from_url(&config.url);
    let pool = cfg
        .builder()
        .map_err(|e| crate::error::Error::Internal(format!("failed to build redis pool: {e}")))?
        .max_size(config.max_connections)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| crate::error::Error::Internal(format!("failed to create redis pool: {e}")))?;

    let conn = pool
        .get()
        .await
        .map_err(|e| crate::error::Error::Internal(format!("failed to get redis connection: {e}")))?;
    drop(conn);

    Ok(pool)
}
