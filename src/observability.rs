//! Tracing/logging initialization
//!
//! JSON structured logs in production, human-readable in development,
//! following the teacher's convention of choosing format from
//! `server.environment` rather than a separate flag.

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

pub fn init_tracing(config: &Config) -> Result<()> {
    let filter =
        EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.server.environment == "production" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(environment = %config.server.environment, "tracing initialized");
    Ok(())
}

pub fn shutdown_tracing() {
    tracing::info!("tracing shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic() {
        let config = Config::default();
        let _ = init_tracing(&config);
    }
}
