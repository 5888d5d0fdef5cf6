//! Agent Registry: in-memory connection table + durable metadata (spec §4.2).
//!
//! `connections` is the ONLY thing protected by the read-write lock described
//! in spec §4.2 — the durable [`AgentStore`] is read/written outside it, so a
//! slow store round-trip never blocks a connection-table lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::model::{Agent, AgentStatus};
use super::queue::DownstreamQueue;
use super::store::AgentStore;
use crate::error::{Error, Result};
use crate::ids::AgentId;

/// One live agent connection, spec §4.2 `ConnectionSlot`.
pub struct ConnectionSlot {
    /// Distinguishes stream generations so a superseded stream's own close
    /// doesn't race-evict the slot a newer connect just installed.
    pub generation: u64,
    pub downstream: Arc<DownstreamQueue>,
    pub metadata: Agent,
    last_report_at: RwLock<DateTime<Utc>>,
    last_sequence: AtomicU64,
}

impl ConnectionSlot {
    fn new(generation: u64, metadata: Agent, queue_capacity: usize) -> Self {
        Self {
            generation,
            downstream: Arc::new(DownstreamQueue::new(queue_capacity)),
            metadata,
            last_report_at: RwLock::new(Utc::now()),
            last_sequence: AtomicU64::new(0),
        }
    }

    pub async fn last_report_at(&self) -> DateTime<Utc> {
        *self.last_report_at.read().await
    }

    /// Records a host-state report's sequence number. Returns `false` if
    /// `sequence` is stale (spec §4.2 "stale reports... are dropped").
    pub async fn accept_sequence(&self, sequence: u64) -> bool {
        let prior = self.last_sequence.fetch_max(sequence, Ordering::SeqCst);
        if sequence <= prior && prior != 0 {
            return false;
        }
        *self.last_report_at.write().await = Utc::now();
        true
    }

    pub async fn touch(&self) {
        *self.last_report_at.write().await = Utc::now();
    }
}

pub struct AgentRegistry {
    connections: RwLock<HashMap<AgentId, Arc<ConnectionSlot>>>,
    store: Arc<dyn AgentStore>,
    next_generation: AtomicU64,
    downstream_queue_depth: usize,
    offline_after: std::time::Duration,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn AgentStore>, downstream_queue_depth: usize, offline_after: std::time::Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            store,
            next_generation: AtomicU64::new(1),
            downstream_queue_depth,
            offline_after,
        }
    }

    pub fn store(&self) -> &Arc<dyn AgentStore> {
        &self.store
    }

    /// Validate a `Register` frame against durable metadata. Does not touch
    /// the connection table.
    pub async fn authenticate(&self, agent_id: &AgentId, secret: &str, hasher: &crate::auth_support::SecretHasher) -> Result<Agent> {
        let agent = self
            .store
            .find_by_id(agent_id)
            .await?
            .ok_or_else(|| Error::Permission(format!("unknown agent {agent_id}")))?;
        if !hasher.verify(secret, &agent.secret_hash) {
            return Err(Error::Permission("invalid agent secret".into()));
        }
        Ok(agent)
    }

    /// Install a new connection slot for `agent_id`, evicting any existing
    /// one (spec §4.2 point 2, §3 invariant "at most one active stream per
    /// agent-id"; E2E scenario 4, "Agent supersede"). Returns the new slot
    /// and the prior slot if one existed so the caller can close it with
    /// "superseded" and migrate its pending downstream messages.
    pub async fn connect(&self, mut metadata: Agent, version: String, platform: String) -> (Arc<ConnectionSlot>, Option<Arc<ConnectionSlot>>) {
        metadata.status = AgentStatus::Online;
        metadata.version = version;
        metadata.platform = platform;
        metadata.last_seen_at = Some(Utc::now());

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let slot = Arc::new(ConnectionSlot::new(generation, metadata.clone(), self.downstream_queue_depth));

        let prior = {
            let mut conns = self.connections.write().await;
            conns.insert(metadata.id.clone(), slot.clone())
        };

        let _ = self.store.upsert(&metadata).await;

        (slot, prior)
    }

    pub async fn is_online(&self, agent_id: &AgentId) -> bool {
        self.connections.read().await.contains_key(agent_id)
    }

    pub async fn slot(&self, agent_id: &AgentId) -> Option<Arc<ConnectionSlot>> {
        self.connections.read().await.get(agent_id).cloned()
    }

    pub async fn online_ids(&self) -> Vec<AgentId> {
        self.connections.read().await.keys().cloned().collect()
    }

    pub async fn online_ids_in_group(&self, group: &str) -> Vec<AgentId> {
        self.connections
            .read()
            .await
            .values()
            .filter(|slot| slot.metadata.group.as_deref() == Some(group))
            .map(|slot| slot.metadata.id.clone())
            .collect()
    }

    /// Remove `agent_id`'s slot only if it's still on `generation` (guards
    /// against a just-superseded stream's cleanup racing a fresher connect).
    /// Marks the agent offline in durable storage and returns the removed
    /// slot so callers can EOF pending terminal sessions / mark pending
    /// probe tasks "agent-gone" (spec §4.2 point 4).
    pub async fn disconnect_if_current(&self, agent_id: &AgentId, generation: u64) -> Option<Arc<ConnectionSlot>> {
        let removed = {
            let mut conns = self.connections.write().await;
            match conns.get(agent_id) {
                Some(slot) if slot.generation == generation => conns.remove(agent_id),
                _ => None,
            }
        };

        if let Some(ref slot) = removed {
            let mut meta = slot.metadata.clone();
            meta.status = AgentStatus::Offline;
            let _ = self.store.upsert(&meta).await;
        }

        removed
    }

    /// Watchdog sweep (spec §4.2 point 4): returns agents whose last report
    /// predates `offline_after`, marking each offline as it goes.
    pub async fn sweep_stale(&self) -> Vec<(AgentId, Arc<ConnectionSlot>)> {
        let now = Utc::now();
        let candidates: Vec<(AgentId, Arc<ConnectionSlot>)> = {
            let conns = self.connections.read().await;
            let mut out = Vec::new();
            for (id, slot) in conns.iter() {
                let last = slot.last_report_at().await;
                if now.signed_duration_since(last).to_std().unwrap_or_default() > self.offline_after {
                    out.push((id.clone(), slot.clone()));
                }
            }
            out
        };

        let mut gone = Vec::new();
        for (id, slot) in candidates {
            if self.disconnect_if_current(&id, slot.generation).await.is_some() {
                gone.push((id, slot));
            }
        }
        gone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::store::InMemoryAgentStore;

    fn agent() -> Agent {
        Agent::new("host-1", "linux/amd64", "hash".into())
    }

    #[tokio::test]
    async fn connect_installs_slot_and_marks_online() {
        let registry = AgentRegistry::new(Arc::new(InMemoryAgentStore::new()), 256, std::time::Duration::from_secs(30));
        let a = agent();
        let (slot, prior) = registry.connect(a.clone(), "1.0".into(), "linux".into()).await;
        assert!(prior.is_none());
        assert!(registry.is_online(&slot.metadata.id).await);
    }

    #[tokio::test]
    async fn reconnect_supersedes_prior_slot() {
        let registry = AgentRegistry::new(Arc::new(InMemoryAgentStore::new()), 256, std::time::Duration::from_secs(30));
        let a = agent();
        let (slot1, _) = registry.connect(a.clone(), "1.0".into(), "linux".into()).await;
        let (slot2, prior) = registry.connect(a.clone(), "1.1".into(), "linux".into()).await;
        assert!(prior.is_some());
        assert_eq!(prior.unwrap().generation, slot1.generation);
        assert_eq!(registry.slot(&a.id).await.unwrap().generation, slot2.generation);
    }

    #[tokio::test]
    async fn stale_sequence_rejected() {
        let registry = AgentRegistry::new(Arc::new(InMemoryAgentStore::new()), 256, std::time::Duration::from_secs(30));
        let a = agent();
        let (slot, _) = registry.connect(a, "1.0".into(), "linux".into()).await;
        assert!(slot.accept_sequence(5).await);
        assert!(slot.accept_sequence(6).await);
        assert!(!slot.accept_sequence(3).await, "stale sequence must be rejected");
    }

    #[tokio::test]
    async fn watchdog_marks_offline_after_timeout() {
        let registry = AgentRegistry::new(Arc::new(InMemoryAgentStore::new()), 256, std::time::Duration::from_millis(10));
        let a = agent();
        registry.connect(a.clone(), "1.0".into(), "linux".into()).await;
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let gone = registry.sweep_stale().await;
        assert_eq!(gone.len(), 1);
        assert!(!registry.is_online(&a.id).await);
    }
}
