//! Stream Mux: the bidirectional Agent RPC (spec §4.2).
//!
//! One `connect()` call per agent lifetime. The first frame must be
//! `Register`; everything after is handled concurrently by two tasks per
//! connection — a reader draining `Upstream` frames into an
//! [`AgentEventSink`] (the mediator spec §9 calls for between Agent Manager
//! and State Cache/Probe Scheduler/Terminal Broker), and a writer draining
//! the per-agent [`super::queue::DownstreamQueue`] onto the outbound gRPC
//! stream.

use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use super::model::HostState;
use super::proto::pb;
use super::proto::pb::{downstream, upstream, Disconnect, Downstream, RegisterAck, Upstream};
use super::registry::AgentRegistry;
use crate::audit::{AuditLogger, Principal, Resource};
use crate::auth_support::SecretHasher;
use crate::ids::{AgentId, MonitorId, SessionUid};

/// Mediator interface between the Agent Manager and everything downstream
/// of it (State Cache, Probe Scheduler, Terminal Broker) — resolves the
/// circular-dependency redesign flagged in spec.md §9 by having the mux
/// depend on a small trait instead of on the concrete subsystems.
#[async_trait]
pub trait AgentEventSink: Send + Sync {
    async fn on_host_state(&self, state: HostState);
    async fn on_probe_result(&self, agent_id: AgentId, monitor_id: MonitorId, up: bool, latency_ms: u32, error: Option<String>);
    async fn on_terminal_data(&self, session_uid: SessionUid, data: Vec<u8>);
    async fn on_docker_event(&self, agent_id: AgentId, payload_json: String);
    async fn on_agent_online(&self, agent_id: AgentId);
    async fn on_agent_offline(&self, agent_id: AgentId);
}

pub struct AgentRpcService {
    registry: Arc<AgentRegistry>,
    sink: Arc<dyn AgentEventSink>,
    audit: AuditLogger,
    hasher: SecretHasher,
    tick_interval_secs: u32,
}

impl AgentRpcService {
    pub fn new(
        registry: Arc<AgentRegistry>,
        sink: Arc<dyn AgentEventSink>,
        audit: AuditLogger,
        hasher: SecretHasher,
        tick_interval_secs: u32,
    ) -> Self {
        Self {
            registry,
            sink,
            audit,
            hasher,
            tick_interval_secs,
        }
    }
}

type ConnectStream = Pin<Box<dyn Stream<Item = std::result::Result<Downstream, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl pb::agent_rpc_server::AgentRpc for AgentRpcService {
    type ConnectStream = ConnectStream;

    async fn connect(&self, request: Request<Streaming<Upstream>>) -> std::result::Result<Response<Self::ConnectStream>, Status> {
        let mut inbound = request.into_inner();

        let first = inbound
            .message()
            .await
            .map_err(|e| Status::internal(e.to_string()))?
            .ok_or_else(|| Status::invalid_argument("stream closed before Register"))?;

        let register = match first.payload {
            Some(upstream::Payload::Register(r)) => r,
            _ => return Err(Status::invalid_argument("first message on the stream must be Register")),
        };

        let agent_id = AgentId::from_str(&register.agent_id).map_err(|_| Status::invalid_argument("malformed agent_id"))?;

        let metadata = self
            .registry
            .authenticate(&agent_id, &register.secret, &self.hasher)
            .await
            .map_err(|e| Status::unauthenticated(e.to_string()))?;

        let (slot, prior) = self
            .registry
            .connect(metadata, register.version.clone(), register.platform.clone())
            .await;

        self.audit
            .log_change(
                Principal::agent(agent_id.to_string()),
                "agent.connect",
                Resource::new("agent", agent_id.to_string()),
                "agent",
                None,
                Some(serde_json::json!({"version": register.version, "platform": register.platform})),
            )
            .await;

        // Spec §4.7: the Alert Engine consumes host-online/host-offline
        // state events alongside probe events, not just the latter.
        self.sink.on_agent_online(agent_id.clone()).await;

        // Supersede: pending work migrates to the new slot first, then the
        // old stream's writer is told to close (spec §4.2 point 2, E2E
        // scenario 4).
        if let Some(prior_slot) = prior {
            let pending = prior_slot.downstream.drain().await;
            slot.downstream.extend(pending).await;
            prior_slot
                .downstream
                .push(Downstream {
                    payload: Some(downstream::Payload::Disconnect(Disconnect {
                        reason: "superseded".into(),
                    })),
                })
                .await;
        }

        let (tx, rx) = mpsc::channel::<std::result::Result<Downstream, Status>>(32);

        let ack = Downstream {
            payload: Some(downstream::Payload::RegisterAck(RegisterAck {
                server_time_unix_ms: Utc::now().timestamp_millis().max(0) as u64,
                tick_interval_secs: self.tick_interval_secs,
            })),
        };
        let _ = tx.send(Ok(ack)).await;

        let writer_slot = slot.clone();
        let writer_tx = tx.clone();
        let writer_handle = tokio::spawn(async move {
            loop {
                let msg = writer_slot.downstream.pop().await;
                let is_disconnect = matches!(msg.payload, Some(downstream::Payload::Disconnect(_)));
                if writer_tx.send(Ok(msg)).await.is_err() {
                    break;
                }
                if is_disconnect {
                    break;
                }
            }
        });

        let registry = self.registry.clone();
        let sink = self.sink.clone();
        let audit = self.audit.clone();
        let reader_agent_id = agent_id.clone();
        let reader_slot = slot.clone();
        let generation = slot.generation;

        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(frame)) => handle_upstream(&reader_slot, &sink, &reader_agent_id, frame).await,
                    Ok(None) => break,
                    Err(error) => {
                        tracing::warn!(agent_id = %reader_agent_id, %error, "agent stream read error");
                        break;
                    }
                }
            }

            if registry.disconnect_if_current(&reader_agent_id, generation).await.is_some() {
                sink.on_agent_offline(reader_agent_id.clone()).await;
                audit
                    .log(crate::audit::AuditEvent::new(
                        Principal::agent(reader_agent_id.to_string()),
                        "agent.disconnect",
                        Resource::new("agent", reader_agent_id.to_string()),
                        "agent",
                    ))
                    .await;
            }
            writer_handle.abort();
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

async fn handle_upstream(
    slot: &Arc<super::registry::ConnectionSlot>,
    sink: &Arc<dyn AgentEventSink>,
    agent_id: &AgentId,
    frame: Upstream,
) {
    match frame.payload {
        Some(upstream::Payload::HostStateReport(r)) => {
            if slot.accept_sequence(r.sequence).await {
                sink.on_host_state(to_host_state(agent_id.clone(), r)).await;
            }
        }
        Some(upstream::Payload::ProbeResult(r)) => {
            slot.touch().await;
            if let Ok(monitor_id) = MonitorId::from_str(&r.monitor_id) {
                sink.on_probe_result(agent_id.clone(), monitor_id, r.up, r.latency_ms, r.error).await;
            }
        }
        Some(upstream::Payload::TerminalData(t)) => {
            slot.touch().await;
            if let Ok(session_uid) = SessionUid::from_str(&t.session_uid) {
                sink.on_terminal_data(session_uid, t.data).await;
            }
        }
        Some(upstream::Payload::DockerEvent(d)) => {
            slot.touch().await;
            sink.on_docker_event(agent_id.clone(), d.payload_json).await;
        }
        Some(upstream::Payload::Heartbeat(_)) => {
            slot.touch().await;
        }
        Some(upstream::Payload::Register(_)) | None => {}
    }
}

fn to_host_state(agent_id: AgentId, r: pb::HostStateReport) -> HostState {
    HostState {
        agent_id,
        sequence: r.sequence,
        reported_at: Utc::now(),
        cpu_percent: r.cpu_percent,
        load_1: r.load1,
        load_5: r.load5,
        load_15: r.load15,
        memory_used_bytes: r.mem_used_bytes,
        memory_total_bytes: r.mem_total_bytes,
        swap_used_bytes: r.swap_used_bytes,
        swap_total_bytes: r.swap_total_bytes,
        disk_used_bytes: r.disk_used_bytes,
        disk_total_bytes: r.disk_total_bytes,
        net_in_bytes_per_sec: r.net_in_bytes_per_sec,
        net_out_bytes_per_sec: r.net_out_bytes_per_sec,
        tcp_connections: r.tcp_conn_count,
        udp_connections: r.udp_conn_count,
        process_count: r.process_count,
        uptime_seconds: r.uptime_secs,
        temperature_celsius: r.temperature_celsius,
        gpu_percent: r.gpu_percent,
    }
}
