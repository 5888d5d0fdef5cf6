//! Upstream splicing and session recording (spec §4.4).
//!
//! [`UpstreamLink`] is the dispatch point [`TerminalKind`] resolves to:
//! host-ssh, docker-exec and k8s-node all speak to the same agent over its
//! existing gRPC stream, so they share [`AgentUpstreamLink`]; k8s-pod reaches
//! an external cluster API instead (injected as [`ClusterExecClient`], a
//! non-goal per spec.md §1 — only the trait boundary lives here).

use async_trait::async_trait;
use std::sync::Arc;

use crate::agent::proto::pb::{downstream, terminal_command, Downstream, Resize, TerminalCommand};
use crate::agent::queue::DownstreamQueue;
use crate::error::{Error, Result};
use crate::ids::SessionUid;

/// One end of a spliced terminal session: wherever client keystrokes and
/// resizes ultimately go.
#[async_trait]
pub trait UpstreamLink: Send + Sync {
    async fn write(&self, data: Vec<u8>) -> Result<()>;
    async fn resize(&self, rows: u32, cols: u32) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Routes host-ssh, docker-exec and k8s-node sessions onto the target
/// agent's existing [`DownstreamQueue`] as `TerminalCommand` frames — no
/// separate transport is opened per session (spec §4.4 "reuses the agent's
/// existing stream").
pub struct AgentUpstreamLink {
    session_uid: SessionUid,
    downstream: Arc<DownstreamQueue>,
}

impl AgentUpstreamLink {
    pub fn new(session_uid: SessionUid, downstream: Arc<DownstreamQueue>) -> Self {
        Self { session_uid, downstream }
    }
}

#[async_trait]
impl UpstreamLink for AgentUpstreamLink {
    async fn write(&self, data: Vec<u8>) -> Result<()> {
        self.downstream
            .push(Downstream {
                payload: Some(downstream::Payload::TerminalCommand(TerminalCommand {
                    session_uid: self.session_uid.to_string(),
                    action: Some(terminal_command::Action::Write(data)),
                })),
            })
            .await;
        Ok(())
    }

    async fn resize(&self, rows: u32, cols: u32) -> Result<()> {
        self.downstream
            .push(Downstream {
                payload: Some(downstream::Payload::TerminalCommand(TerminalCommand {
                    session_uid: self.session_uid.to_string(),
                    action: Some(terminal_command::Action::Resize(Resize { rows, cols })),
                })),
            })
            .await;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.downstream
            .push(Downstream {
                payload: Some(downstream::Payload::TerminalCommand(TerminalCommand {
                    session_uid: self.session_uid.to_string(),
                    action: Some(terminal_command::Action::Close(true)),
                })),
            })
            .await;
        Ok(())
    }
}

/// External collaborator for k8s-pod sessions (spec §1 non-goal: "the
/// Kubernetes exec client"). Only the boundary is modeled here; callers
/// inject a real implementation.
#[async_trait]
pub trait ClusterExecClient: Send + Sync {
    async fn open(&self, cluster: &str, namespace: &str, pod: &str, container: Option<&str>) -> Result<Box<dyn UpstreamLink>>;
}

/// Placeholder link used when no [`ClusterExecClient`] is configured —
/// returns an error on first use rather than silently discarding input.
pub struct UnavailableUpstreamLink {
    reason: String,
}

impl UnavailableUpstreamLink {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl UpstreamLink for UnavailableUpstreamLink {
    async fn write(&self, _data: Vec<u8>) -> Result<()> {
        Err(Error::Invalid(self.reason.clone()))
    }

    async fn resize(&self, _rows: u32, _cols: u32) -> Result<()> {
        Err(Error::Invalid(self.reason.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Outcome of a recording close, handed back to callers that persist
/// `TerminalSession::recording_ref`.
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    pub size_bytes: u64,
    pub duration_ms: u64,
    pub recording_ref: Option<String>,
}

/// Recording sink for a terminal session. The actual file-format writer
/// (e.g. asciicast) is an external collaborator per spec.md §1 — only the
/// boundary lives here, with in-memory/null doubles for tests and for
/// sessions that opt out of recording.
#[async_trait]
pub trait RecordingSink: Send + Sync {
    async fn record_input(&self, data: &[u8]);
    async fn record_output(&self, data: &[u8]);
    async fn resize(&self, rows: u32, cols: u32);
    async fn close(self: Box<Self>) -> RecordingSummary;
}

pub struct NullRecordingSink;

#[async_trait]
impl RecordingSink for NullRecordingSink {
    async fn record_input(&self, _data: &[u8]) {}
    async fn record_output(&self, _data: &[u8]) {}
    async fn resize(&self, _rows: u32, _cols: u32) {}
    async fn close(self: Box<Self>) -> RecordingSummary {
        RecordingSummary { size_bytes: 0, duration_ms: 0, recording_ref: None }
    }
}

pub struct InMemoryRecordingSink {
    started_at: std::time::Instant,
    bytes: tokio::sync::Mutex<Vec<u8>>,
}

impl InMemoryRecordingSink {
    pub fn new() -> Self {
        Self {
            started_at: std::time::Instant::now(),
            bytes: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryRecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordingSink for InMemoryRecordingSink {
    async fn record_input(&self, data: &[u8]) {
        self.bytes.lock().await.extend_from_slice(data);
    }

    async fn record_output(&self, data: &[u8]) {
        self.bytes.lock().await.extend_from_slice(data);
    }

    async fn resize(&self, _rows: u32, _cols: u32) {}

    async fn close(self: Box<Self>) -> RecordingSummary {
        let size_bytes = self.bytes.lock().await.len() as u64;
        RecordingSummary {
            size_bytes,
            duration_ms: self.started_at.elapsed().as_millis() as u64,
            recording_ref: Some(format!("memory:{size_bytes}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn agent_link_writes_terminal_command_onto_downstream_queue() {
        let queue = Arc::new(DownstreamQueue::new(8));
        let link = AgentUpstreamLink::new(SessionUid::new(), queue.clone());
        link.write(b"ls\n".to_vec()).await.unwrap();
        assert_eq!(queue.len().await, 1);
        let msg = queue.pop().await;
        match msg.payload {
            Some(downstream::Payload::TerminalCommand(cmd)) => {
                assert!(matches!(cmd.action, Some(terminal_command::Action::Write(_))));
            }
            _ => panic!("expected terminal command"),
        }
    }

    #[tokio::test]
    async fn unavailable_link_rejects_writes() {
        let link = UnavailableUpstreamLink::new("no cluster client configured");
        assert!(link.write(vec![1]).await.is_err());
        assert!(link.close().await.is_ok());
    }

    #[tokio::test]
    async fn in_memory_recording_sink_accumulates_bytes() {
        let sink: Box<dyn RecordingSink> = Box::new(InMemoryRecordingSink::new());
        sink.record_input(b"a").await;
        sink.record_output(b"bc").await;
        let summary = sink.close().await;
        assert_eq!(summary.size_bytes, 3);
        assert!(summary.recording_ref.is_some());
    }
}
