//! Bounded per-agent downstream queue (spec §4.2 point 3, §5 "agent-downstream-queue").
//!
//! FIFO, capacity-bounded. When full, the oldest droppable message is
//! evicted to make room for the incoming one — `ProbeTask` first (lowest
//! priority, matching spec's "probe tasks" tier), then `DockerCommand`.
//! `TerminalCommand` and `Disconnect` are never dropped: if the queue is
//! full of non-droppable messages, it grows past capacity rather than lose
//! a keystroke or a disconnect order, which spec §4.2 marks as invariants.

use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};

use super::proto::pb::downstream::Payload;
use super::proto::pb::Downstream;

fn is_critical(msg: &Downstream) -> bool {
    matches!(
        msg.payload,
        Some(Payload::TerminalCommand(_)) | Some(Payload::Disconnect(_)) | Some(Payload::RegisterAck(_))
    )
}

/// Lower number = evicted first.
fn eviction_rank(msg: &Downstream) -> u8 {
    match msg.payload {
        Some(Payload::ProbeTask(_)) => 0,
        Some(Payload::DockerCommand(_)) => 1,
        _ => u8::MAX,
    }
}

pub struct DownstreamQueue {
    capacity: usize,
    inner: Mutex<VecDeque<Downstream>>,
    notify: Notify,
}

impl DownstreamQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(256))),
            notify: Notify::new(),
        }
    }

    /// Push a message, applying the overflow policy above.
    pub async fn push(&self, msg: Downstream) {
        let mut q = self.inner.lock().await;
        if q.len() >= self.capacity {
            if let Some(evict_idx) = lowest_priority_evictable(&q, &msg) {
                q.remove(evict_idx);
                tracing::debug!("downstream queue full, evicted lower-priority message");
            } else if !is_critical(&msg) {
                tracing::warn!("downstream queue full, dropping incoming non-critical message");
                return;
            }
            // else: critical message, queue grows past capacity rather than drop it.
        }
        q.push_back(msg);
        drop(q);
        self.notify.notify_one();
    }

    /// Pop the oldest message, waiting if the queue is empty.
    pub async fn pop(&self) -> Downstream {
        loop {
            {
                let mut q = self.inner.lock().await;
                if let Some(msg) = q.pop_front() {
                    return msg;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Drain all pending messages without waiting (used on supersede, spec
    /// E2E scenario 4: "queue survives supersede" — the new connection
    /// adopts whatever the prior stream hadn't delivered yet).
    pub async fn drain(&self) -> Vec<Downstream> {
        let mut q = self.inner.lock().await;
        q.drain(..).collect()
    }

    pub async fn extend(&self, messages: Vec<Downstream>) {
        if messages.is_empty() {
            return;
        }
        let mut q = self.inner.lock().await;
        for msg in messages {
            q.push_back(msg);
        }
        drop(q);
        self.notify.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Find the oldest message at the lowest eviction tier (ProbeTask before
/// DockerCommand), i.e. the first candidate spec's overflow policy would
/// drop. Returns `None` if nothing in the queue is droppable.
fn lowest_priority_evictable(q: &VecDeque<Downstream>, _incoming: &Downstream) -> Option<usize> {
    q.iter()
        .enumerate()
        .filter(|(_, m)| eviction_rank(m) != u8::MAX)
        .min_by_key(|(i, m)| (eviction_rank(m), *i))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::proto::pb::{downstream, Disconnect, Downstream, ProbeTask};

    fn probe(id: &str) -> Downstream {
        Downstream {
            payload: Some(downstream::Payload::ProbeTask(ProbeTask {
                monitor_id: id.to_string(),
                probe_type: "tcp".into(),
                target: "x".into(),
                timeout_ms: 1000,
            })),
        }
    }

    fn disconnect() -> Downstream {
        Downstream {
            payload: Some(downstream::Payload::Disconnect(Disconnect { reason: "bye".into() })),
        }
    }

    #[tokio::test]
    async fn evicts_oldest_probe_task_when_full() {
        let q = DownstreamQueue::new(2);
        q.push(probe("a")).await;
        q.push(probe("b")).await;
        q.push(probe("c")).await;
        assert_eq!(q.len().await, 2);
        let first = q.pop().await;
        match first.payload {
            Some(downstream::Payload::ProbeTask(p)) => assert_eq!(p.monitor_id, "b"),
            _ => panic!("expected probe task"),
        }
    }

    #[tokio::test]
    async fn never_drops_disconnect() {
        let q = DownstreamQueue::new(1);
        q.push(probe("a")).await;
        q.push(disconnect()).await;
        // disconnect evicted the probe task, queue stayed at capacity
        assert_eq!(q.len().await, 1);
        let msg = q.pop().await;
        assert!(matches!(msg.payload, Some(downstream::Payload::Disconnect(_))));
    }

    #[tokio::test]
    async fn fifo_order_preserved() {
        let q = DownstreamQueue::new(10);
        q.push(probe("1")).await;
        q.push(probe("2")).await;
        let first = q.pop().await;
        match first.payload {
            Some(downstream::Payload::ProbeTask(p)) => assert_eq!(p.monitor_id, "1"),
            _ => panic!(),
        }
    }
}
