//! Agent Manager (spec §4.2): registration, liveness, and the bidirectional
//! stream mux that carries host-state reports, probe results, terminal
//! data, and docker events down from/up to remote agents.

pub mod model;
pub mod mux;
pub mod proto;
pub mod queue;
pub mod registry;
pub mod store;

pub use model::{Agent, AgentStatus, HostState};
pub use mux::{AgentEventSink, AgentRpcService};
pub use queue::DownstreamQueue;
pub use registry::{AgentRegistry, ConnectionSlot};
pub use store::{AgentStore, InMemoryAgentStore, PgAgentStore};
