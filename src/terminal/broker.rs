//! Terminal Broker (spec §4.4): splices a client-facing session onto an
//! [`UpstreamLink`] and a [`RecordingSink`], and tears both down exactly
//! once no matter which side closes first.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};

use super::link::{RecordingSink, UpstreamLink};
use super::model::{TerminalSession, TerminalTarget};
use super::store::TerminalStore;
use crate::agent::registry::AgentRegistry;
use crate::audit::{AuditEvent, AuditLogger, Principal, Resource};
use crate::error::{Error, Result};
use crate::ids::{AgentId, SessionUid};

/// A message pushed out to the client side of a session (terminal output,
/// or an end-of-session notice).
#[derive(Clone)]
pub enum ClientMessage {
    Output(Vec<u8>),
    Closed { reason: String },
}

struct SessionHandle {
    upstream: Box<dyn UpstreamLink>,
    recording: Mutex<Option<Box<dyn RecordingSink>>>,
    client_tx: mpsc::Sender<ClientMessage>,
    target_agent_id: Option<AgentId>,
}

/// Live, in-process session table plus durable session records. One active
/// session per `session_uid`; `open()` creates both, `close()` is the only
/// path that removes a session and is safe to call from either direction
/// (client hangs up, or the upstream disconnects) because the first caller
/// to successfully remove the map entry performs the teardown and the
/// second finds nothing to do (spec §4.4 "whichever side closes first wins").
pub struct TerminalBroker {
    store: Arc<dyn TerminalStore>,
    audit: AuditLogger,
    sessions: RwLock<HashMap<SessionUid, Arc<SessionHandle>>>,
}

impl TerminalBroker {
    pub fn new(store: Arc<dyn TerminalStore>, audit: AuditLogger) -> Arc<Self> {
        Arc::new(Self {
            store,
            audit,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Register a new session: persists the durable record and wires the
    /// given upstream/recording pair into the session table, returning the
    /// channel the caller should drain to push bytes out to its client.
    pub async fn open(
        &self,
        session: TerminalSession,
        upstream: Box<dyn UpstreamLink>,
        recording: Box<dyn RecordingSink>,
    ) -> Result<mpsc::Receiver<ClientMessage>> {
        let target_agent_id = match &session.target {
            TerminalTarget::Agent { agent_id } => Some(agent_id.clone()),
            TerminalTarget::ClusterPod { .. } => None,
        };

        let (tx, rx) = mpsc::channel(256);
        let handle = Arc::new(SessionHandle {
            upstream,
            recording: Mutex::new(Some(recording)),
            client_tx: tx,
            target_agent_id,
        });

        self.store.upsert(&session).await?;
        self.sessions.write().await.insert(session.session_uid.clone(), handle);

        self.audit
            .log(AuditEvent::new(
                Principal::user(session.owner.clone()),
                "terminal.open",
                Resource::new("terminal_session", session.session_uid.to_string()),
                "terminal",
            ))
            .await;

        Ok(rx)
    }

    /// Client keystrokes/paste: forwarded to the upstream and recorded as
    /// input.
    pub async fn on_client_data(&self, session_uid: &SessionUid, data: Vec<u8>) -> Result<()> {
        let handle = self.handle_for(session_uid).await?;
        if let Some(recording) = handle.recording.lock().await.as_ref() {
            recording.record_input(&data).await;
        }
        handle.upstream.write(data).await
    }

    /// Bytes arriving from the upstream side (agent terminal data frames):
    /// recorded as output and forwarded to the client channel.
    pub async fn on_upstream_data(&self, session_uid: &SessionUid, data: Vec<u8>) {
        let handle = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_uid) {
                Some(h) => h.clone(),
                None => return,
            }
        };
        if let Some(recording) = handle.recording.lock().await.as_ref() {
            recording.record_output(&data).await;
        }
        let _ = handle.client_tx.send(ClientMessage::Output(data)).await;
    }

    pub async fn resize(&self, session_uid: &SessionUid, rows: u32, cols: u32) -> Result<()> {
        let handle = self.handle_for(session_uid).await?;
        if let Some(recording) = handle.recording.lock().await.as_ref() {
            recording.resize(rows, cols).await;
        }
        handle.upstream.resize(rows, cols).await
    }

    /// Close a session. Idempotent: only the caller that actually removes
    /// the map entry runs the teardown sequence.
    pub async fn close(&self, session_uid: &SessionUid, reason: &str) -> Result<()> {
        let handle = {
            let mut sessions = self.sessions.write().await;
            match sessions.remove(session_uid) {
                Some(h) => h,
                None => return Ok(()),
            }
        };

        let _ = handle.upstream.close().await;
        let _ = handle.client_tx.send(ClientMessage::Closed { reason: reason.to_string() }).await;

        let recording = handle.recording.lock().await.take();
        let summary = if let Some(sink) = recording { Some(sink.close().await) } else { None };

        if let Some(mut session) = self.store.find_by_id(session_uid).await? {
            session.ended_at = Some(chrono::Utc::now());
            if let Some(summary) = &summary {
                session.recording_ref = summary.recording_ref.clone();
            }
            self.store.upsert(&session).await?;
        }

        self.audit
            .log(AuditEvent::new(
                Principal::system(),
                "terminal.close",
                Resource::new("terminal_session", session_uid.to_string()),
                "terminal",
            ).with_data("reason", serde_json::json!(reason)))
            .await;

        Ok(())
    }

    /// Close every session routed through `agent_id` (spec §4.2 point 4:
    /// sessions whose target agent disconnects are ended with "agent-gone").
    pub async fn on_agent_offline(&self, agent_id: &AgentId) {
        let affected: Vec<SessionUid> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, h)| h.target_agent_id.as_ref() == Some(agent_id))
                .map(|(id, _)| id.clone())
                .collect()
        };
        for session_uid in affected {
            let _ = self.close(&session_uid, "agent-gone").await;
        }
    }

    async fn handle_for(&self, session_uid: &SessionUid) -> Result<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .get(session_uid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no active terminal session {session_uid}")))
    }

    /// Convenience used by the registry watchdog: terminate sessions whose
    /// agent went offline via [`AgentRegistry::sweep_stale`].
    pub async fn reap_for_offline_agents(&self, registry: &AgentRegistry) {
        let online: std::collections::HashSet<AgentId> = registry.online_ids().await.into_iter().collect();
        let stale: Vec<AgentId> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter_map(|h| h.target_agent_id.clone())
                .filter(|id| !online.contains(id))
                .collect()
        };
        for agent_id in stale {
            self.on_agent_offline(&agent_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::queue::DownstreamQueue;
    use crate::audit::pipeline::AuditPipeline;
    use crate::audit::storage::memory::MemoryAuditStorage;
    use crate::config::AuditConfig;
    use crate::terminal::link::{AgentUpstreamLink, InMemoryRecordingSink};
    use crate::terminal::model::TerminalKind;
    use crate::terminal::store::InMemoryTerminalStore;

    async fn broker() -> Arc<TerminalBroker> {
        let (_pipeline, handle) = AuditPipeline::start(AuditConfig::default(), Arc::new(MemoryAuditStorage::new())).await.unwrap();
        let audit = AuditLogger::new(handle, AuditConfig::default());
        TerminalBroker::new(Arc::new(InMemoryTerminalStore::new()), audit)
    }

    #[tokio::test]
    async fn open_then_client_data_reaches_upstream_queue() {
        let broker = broker().await;
        let agent_id = AgentId::new();
        let session = TerminalSession::new("user-1", TerminalTarget::Agent { agent_id: agent_id.clone() }, TerminalKind::HostSsh, 24, 80);
        let queue = Arc::new(DownstreamQueue::new(8));
        let upstream = Box::new(AgentUpstreamLink::new(session.session_uid.clone(), queue.clone()));
        let recording = Box::new(InMemoryRecordingSink::new());

        let mut rx = broker.open(session.clone(), upstream, recording).await.unwrap();
        broker.on_client_data(&session.session_uid, b"ls\n".to_vec()).await.unwrap();
        assert_eq!(queue.len().await, 1);

        broker.on_upstream_data(&session.session_uid, b"out".to_vec()).await;
        match rx.recv().await.unwrap() {
            ClientMessage::Output(data) => assert_eq!(data, b"out"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let broker = broker().await;
        let session = TerminalSession::new("user-1", TerminalTarget::Agent { agent_id: AgentId::new() }, TerminalKind::HostSsh, 24, 80);
        let queue = Arc::new(DownstreamQueue::new(8));
        let upstream = Box::new(AgentUpstreamLink::new(session.session_uid.clone(), queue));
        let recording = Box::new(InMemoryRecordingSink::new());
        broker.open(session.clone(), upstream, recording).await.unwrap();

        broker.close(&session.session_uid, "client-hangup").await.unwrap();
        // second close on an already-removed session is a silent no-op
        broker.close(&session.session_uid, "client-hangup").await.unwrap();

        let stored = broker.store.find_by_id(&session.session_uid).await.unwrap().unwrap();
        assert!(stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn offline_agent_closes_its_sessions_only() {
        let broker = broker().await;
        let target_agent = AgentId::new();
        let other_agent = AgentId::new();

        let s1 = TerminalSession::new("user-1", TerminalTarget::Agent { agent_id: target_agent.clone() }, TerminalKind::HostSsh, 24, 80);
        let s2 = TerminalSession::new("user-1", TerminalTarget::Agent { agent_id: other_agent }, TerminalKind::HostSsh, 24, 80);

        for session in [&s1, &s2] {
            let queue = Arc::new(DownstreamQueue::new(8));
            let upstream = Box::new(AgentUpstreamLink::new(session.session_uid.clone(), queue));
            let recording = Box::new(InMemoryRecordingSink::new());
            broker.open(session.clone(), upstream, recording).await.unwrap();
        }

        broker.on_agent_offline(&target_agent).await;

        assert!(broker.store.find_by_id(&s1.session_uid).await.unwrap().unwrap().ended_at.is_some());
        assert!(broker.store.find_by_id(&s2.session_uid).await.unwrap().unwrap().ended_at.is_none());
    }
}

impl std::fmt::Debug for ClientMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientMessage::Output(data) => write!(f, "Output({} bytes)", data.len()),
            ClientMessage::Closed { reason } => write!(f, "Closed({reason})"),
        }
    }
}
