//! gRPC server: binds the Agent RPC service (spec §4.2) to `config.server.rpc_port`.

use std::net::SocketAddr;
use std::sync::Arc;

use tonic::transport::Server;

use crate::agent::mux::AgentRpcService;
use crate::agent::proto::pb::agent_rpc_server::AgentRpcServer;
use crate::config::ServerConfig;
use crate::error::Result;

/// Thin wrapper around `tonic::transport::Server` carrying just the one
/// service this control plane exposes to agents.
pub struct GrpcServer {
    addr: SocketAddr,
    service: Arc<AgentRpcService>,
}

impl GrpcServer {
    pub fn new(config: &ServerConfig, service: Arc<AgentRpcService>) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], config.rpc_port)),
            service,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `shutdown` resolves, then stop accepting new streams.
    pub async fn serve(self, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<()> {
        let (_health_reporter, health_service) = tonic_health::server::health_reporter();

        tracing::info!(addr = %self.addr, "agent RPC listening");

        Server::builder()
            .tcp_keepalive(Some(std::time::Duration::from_secs(60)))
            .add_service(health_service)
            .add_service(AgentRpcServer::from_arc(self.service))
            .serve_with_shutdown(self.addr, shutdown)
            .await?;

        Ok(())
    }
}
