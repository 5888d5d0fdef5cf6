//! Terminal Broker data model (spec §3 "TerminalSession", §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, SessionUid};

/// What kind of upstream workload a session is wired to (spec §4.4). Each
/// variant picks a distinct [`super::link::UpstreamLink`] implementation —
/// the "reflection-based lookup" redesign flagged in spec.md §9, made
/// concrete as dispatch-by-enum instead of dispatch-by-type-navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    HostSsh,
    DockerExec,
    K8sPod,
    K8sNode,
}

/// The upstream endpoint a session's I/O is spliced to: either an agent
/// (host-ssh, docker-exec, k8s-node all route through the agent stream) or
/// cluster/pod coordinates reached via an external cluster API (k8s-pod).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalTarget {
    Agent { agent_id: AgentId },
    ClusterPod { cluster: String, namespace: String, pod: String, container: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalDimensions {
    pub rows: u32,
    pub cols: u32,
}

/// A single terminal session (spec §3). Owns no I/O itself — the
/// [`super::broker::TerminalBroker`] holds the live upstream/recording
/// handles; this is the durable record of the session's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSession {
    pub session_uid: SessionUid,
    pub owner: String,
    pub target: TerminalTarget,
    pub kind: TerminalKind,
    pub dimensions: TerminalDimensions,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub recording_ref: Option<String>,
}

impl TerminalSession {
    pub fn new(owner: impl Into<String>, target: TerminalTarget, kind: TerminalKind, rows: u32, cols: u32) -> Self {
        Self {
            session_uid: SessionUid::new(),
            owner: owner.into(),
            target,
            kind,
            dimensions: TerminalDimensions { rows, cols },
            started_at: Utc::now(),
            ended_at: None,
            recording_ref: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_active() {
        let session = TerminalSession::new("user-1", TerminalTarget::Agent { agent_id: AgentId::new() }, TerminalKind::HostSsh, 24, 80);
        assert!(session.is_active());
        assert!(session.recording_ref.is_none());
    }
}
