//! Terminal Broker (spec §4.4): interactive shells spliced onto agents (or,
//! for Kubernetes pods, an external cluster API), with optional session
//! recording.

pub mod broker;
pub mod link;
pub mod model;
pub mod store;

pub use broker::{ClientMessage, TerminalBroker};
pub use link::{AgentUpstreamLink, ClusterExecClient, InMemoryRecordingSink, NullRecordingSink, RecordingSink, RecordingSummary, UnavailableUpstreamLink, UpstreamLink};
pub use model::{TerminalDimensions, TerminalKind, TerminalSession, TerminalTarget};
pub use store::{InMemoryTerminalStore, PgTerminalStore, TerminalStore};
