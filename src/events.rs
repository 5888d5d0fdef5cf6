//! NATS client management and publish helpers
//!
//! Used for the Alert Engine's `alerts.<rule_id>` fan-out and for any other
//! subsystem that needs a best-effort pub/sub notification outside the
//! audit/storage path.

use async_nats::Client;
use std::time::Duration;

use crate::{
    config::NatsConfig,
    error::{Error, Result},
};

pub(crate) async fn create_client(config: &NatsConfig) -> Result<Client> {
    create_client_with_retries(config, config.max_retries).await
}

async fn create_client_with_retries(config: &NatsConfig, max_retries: u32) -> Result<Client> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_client(config).await {
            Ok(client) => {
                if attempt > 0 {
                    tracing::info!("nats connection established after {} attempt(s)", attempt + 1);
                } else {
                    tracing::info!(url = %config.url, "nats client connected");
                }
                return Ok(client);
            }
            Err(e) => {
                attempt += 1;
                if attempt > max_retries {
                    tracing::error!("failed to connect to nats after {} attempts: {}", max_retries + 1, e);
                    return Err(e);
                }

                let delay = base_delay * 2_u32.pow(attempt.saturating_sub(1));
                tracing::warn!("nats connection attempt {} failed: {}. retrying in {:?}...", attempt, e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn try_create_client(config: &NatsConfig) -> Result<Client> {
    let mut opts = async_nats::ConnectOptions::new();
    if let Some(name) = &config.name {
        opts = opts.name(name);
    }
    opts = opts.max_reconnects(Some(config.max_reconnects));

    opts.connect(&config.url)
        .await
        .map_err(|e| Error::Nats(format!("failed to connect to nats server at '{}': {e}", config.url)))
}

pub async fn publish_json<T: serde::Serialize>(client: &Client, subject: &str, payload: &T) -> Result<()> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| Error::Internal(format!("failed to serialize event: {e}")))?;

    client
        .publish(subject.to_string(), json.into())
        .await
        .map_err(|e| Error::Nats(format!("failed to publish to {subject}: {e}")))?;

    Ok(())
}
