//! State Cache (spec §4.3): latest-value cache of [`HostState`] keyed by
//! agent-id, fed by the Stream Mux and read by REST handlers and a
//! publish/subscribe layer that forwards deltas to subscribers.
//!
//! Per spec §9's "circular dependency between state cache and agent
//! manager" redesign flag: rather than two structs referencing each other,
//! `StateCache` holds a one-way `Arc<AgentRegistry>` dependency (for the
//! archival ticker's "online agents only" query) and the Agent Manager
//! depends on nothing here directly — the [`crate::agent::mux::AgentEventSink`]
//! trait is the mediator spec.md §9 calls for, and whatever wires the two
//! together (the `opsplane` binary) implements it by calling
//! [`StateCache::record`].

pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::agent::model::HostState;
use crate::agent::registry::AgentRegistry;
use crate::ids::AgentId;
use store::StateArchive;

/// Identifies one subscriber registration, returned by [`StateCache::subscribe`]
/// so the caller can later [`StateCache::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// One pushed delta, shaped to match spec §6's WebSocket contract:
/// `{action: "state_update", data: {host_id, ...state}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StateCacheMessage {
    StateUpdate { data: StateUpdate },
}

#[derive(Debug, Clone, Serialize)]
pub struct StateUpdate {
    pub host_id: AgentId,
    #[serde(flatten)]
    pub state: HostState,
}

struct Subscriber {
    sender: mpsc::Sender<StateCacheMessage>,
    /// `None` means "all agents" (spec §4.3: "an empty filter means all").
    filter: Option<std::collections::HashSet<AgentId>>,
}

/// Latest-value cache keyed by agent-id (spec §4.3).
///
/// Per-agent locking is provided by [`DashMap`]'s shard striping — a slow
/// subscriber fan-out for one agent's update never blocks a concurrent
/// write for a different agent (spec §5 "state cache uses per-agent
/// locks").
pub struct StateCache {
    latest: DashMap<AgentId, HostState>,
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    archive: Arc<dyn StateArchive>,
    registry: Arc<AgentRegistry>,
}

impl StateCache {
    pub fn new(archive: Arc<dyn StateArchive>, registry: Arc<AgentRegistry>) -> Arc<Self> {
        Arc::new(Self {
            latest: DashMap::new(),
            subscribers: RwLock::new(HashMap::new()),
            archive,
            registry,
        })
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<HostState> {
        self.latest.get(agent_id).map(|entry| entry.clone())
    }

    /// Overwrite the cached state for `state.agent_id` and fan the delta
    /// out to matching subscribers (spec §4.3 "writes from the Stream Mux",
    /// invoked by [`crate::agent::mux::AgentEventSink::on_host_state`]).
    pub async fn record(&self, state: HostState) {
        let agent_id = state.agent_id.clone();
        self.latest.insert(agent_id.clone(), state.clone());

        let message = StateCacheMessage::StateUpdate {
            data: StateUpdate { host_id: agent_id.clone(), state },
        };

        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (id, sub) in subscribers.iter() {
                if let Some(filter) = &sub.filter {
                    if !filter.contains(&agent_id) {
                        continue;
                    }
                }
                if sub.sender.send(message.clone()).await.is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in dead {
                subscribers.remove(&id);
            }
        }
    }

    /// Subscribe to state deltas. `filter` restricts delivery to the listed
    /// agent-ids; an empty or `None` filter means "all" (spec §4.3).
    pub async fn subscribe(&self, filter: Option<Vec<AgentId>>) -> (SubscriptionId, mpsc::Receiver<StateCacheMessage>) {
        let (tx, rx) = mpsc::channel(128);
        let id = SubscriptionId::new();
        let filter = filter
            .filter(|f| !f.is_empty())
            .map(|f| f.into_iter().collect());
        self.subscribers.write().await.insert(id, Subscriber { sender: tx, filter });
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().await.remove(&id);
    }

    /// Background ticker: samples every online agent's latest state into
    /// the archive store, recording a `None` gap for any agent that's gone
    /// offline since its last report (spec §4.3 "Archival").
    pub fn spawn_archival(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let online = self.registry.online_ids().await;
                let at = Utc::now();
                for agent_id in online {
                    let state = self.get(&agent_id);
                    if let Err(error) = self.archive.record_sample(&agent_id, state.as_ref(), at).await {
                        tracing::warn!(%agent_id, %error, "failed to archive host state sample");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::store::InMemoryAgentStore;
    use std::time::Duration as StdDuration;

    fn state(agent_id: AgentId) -> HostState {
        HostState {
            agent_id,
            sequence: 1,
            reported_at: Utc::now(),
            cpu_percent: 1.0,
            load_1: 0.1,
            load_5: 0.1,
            load_15: 0.1,
            memory_used_bytes: 1,
            memory_total_bytes: 2,
            swap_used_bytes: 0,
            swap_total_bytes: 0,
            disk_used_bytes: 0,
            disk_total_bytes: 0,
            net_in_bytes_per_sec: 0,
            net_out_bytes_per_sec: 0,
            tcp_connections: 0,
            udp_connections: 0,
            process_count: 1,
            uptime_seconds: 1,
            temperature_celsius: None,
            gpu_percent: None,
        }
    }

    fn cache() -> Arc<StateCache> {
        let registry = Arc::new(AgentRegistry::new(Arc::new(InMemoryAgentStore::new()), 16, StdDuration::from_secs(30)));
        StateCache::new(Arc::new(store::InMemoryStateArchive::new()), registry)
    }

    #[tokio::test]
    async fn record_overwrites_latest() {
        let cache = cache();
        let agent_id = AgentId::new();
        cache.record(state(agent_id.clone())).await;
        assert!(cache.get(&agent_id).is_some());
    }

    #[tokio::test]
    async fn subscriber_with_filter_only_receives_matching_agent() {
        let cache = cache();
        let watched = AgentId::new();
        let other = AgentId::new();
        let (_id, mut rx) = cache.subscribe(Some(vec![watched.clone()])).await;

        cache.record(state(other)).await;
        cache.record(state(watched.clone())).await;

        let StateCacheMessage::StateUpdate { data } = rx.recv().await.expect("expected one delta");
        assert_eq!(data.host_id, watched);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let cache = cache();
        let agent_id = AgentId::new();
        let (id, mut rx) = cache.subscribe(None).await;
        cache.unsubscribe(id).await;
        cache.record(state(agent_id)).await;
        assert!(rx.try_recv().is_err());
    }
}
