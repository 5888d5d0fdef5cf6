//! HTTP server with graceful shutdown

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;

use crate::{
    config::{Config, ServerConfig},
    error::Result,
};

/// HTTP server instance bound to [`ServerConfig`].
///
/// The middleware stack (CORS, compression, timeouts, request tracking,
/// panic recovery) is applied by [`crate::service_builder::router`] when the
/// app is built — this type only binds the listener and drives graceful
/// shutdown, so it runs whatever router it's handed as-is.
pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config: config.server,
        }
    }

    pub fn from_server_config(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Run the server with the given router until a shutdown signal arrives.
    pub async fn serve(self, app: Router) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));

        tracing::info!(port = self.config.http_port, "starting opsplane HTTP server");

        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server shutdown complete");

        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        },
    }

    tracing::info!("shutdown signal received, draining requests");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creation() {
        let config = Config::default();
        let server = Server::new(config.clone());
        assert_eq!(server.config().http_port, config.server.http_port);
    }
}
