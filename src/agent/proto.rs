//! Generated Agent RPC types (spec §4.2, §6), compiled from `proto/agent.proto`
//! by `build.rs` via `tonic-prost-build`.

pub mod pb {
    tonic::include_proto!("opsplane.agent.v1");
}
