//! gRPC transport for the Agent RPC (spec §4.2, §6 "Agent RPC").
//!
//! A single bidirectional-streaming service, `AgentRpc`, carries every
//! upstream/downstream message enumerated in spec §4.2. A `tonic_health`
//! service rides alongside it on the same `tonic::transport::Server` so
//! operators get `grpc.health.v1` for free.

pub mod server;

pub use server::GrpcServer;
pub use tonic::{Code, Request, Response, Status};
