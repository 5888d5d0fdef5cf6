//! Audit event pipeline: bounded ingestion queue fed by a pool of worker
//! tasks that batch events and hand them to storage.
//!
//! Replaces the teacher's single sequential `AuditAgent` actor with the
//! architecture spec'd for this service: a bounded `mpsc` channel (default
//! capacity 1000) shared by `audit.workers` (default 2) worker tasks. Each
//! worker accumulates a batch until it reaches `batch_size` (default 50) or
//! `flush_interval` elapses (default 5s), whichever comes first, then hands
//! the batch to storage in one round-trip.
//!
//! Producers enqueue with a bounded wait (`enqueue_timeout`, default 100ms);
//! if the queue is still full after that, the event is dropped rather than
//! blocking the caller — audit logging must never add latency to the
//! request path it's observing.
//!
//! Hash-chain sealing (sequence + BLAKE3 hash) happens at dequeue time under
//! a shared `Mutex<AuditChain>`, so ordering across workers is still a
//! total order even though enqueue order across producers is not
//! guaranteed to match dequeue order exactly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::chain::AuditChain;
use super::event::AuditEvent;
use super::storage::AuditStorage;
use super::syslog::{SyslogConfig, SyslogSender, SyslogTransport};
use crate::config::AuditConfig;

/// Handle used by producers (the `AuditLogger`) to enqueue events.
#[derive(Clone)]
pub struct AuditPipelineHandle {
    sender: mpsc::Sender<AuditEvent>,
    enqueue_timeout: Duration,
    dropped: Arc<AtomicU64>,
}

impl AuditPipelineHandle {
    /// Enqueue an event, waiting up to `enqueue_timeout` for room in the
    /// channel. Drops the event (incrementing the dropped counter) rather
    /// than blocking the caller if the queue stays full.
    pub async fn enqueue(&self, event: AuditEvent) {
        match tokio::time::timeout(self.enqueue_timeout, self.sender.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("audit pipeline channel closed, event dropped"),
            Err(_) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(total_dropped = total, "audit pipeline queue full, event dropped");
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Owns the worker pool. Dropping this stops accepting new events once all
/// [`AuditPipelineHandle`] clones are dropped and in-flight batches drain.
pub struct AuditPipeline {
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl AuditPipeline {
    /// Start the worker pool against `storage`, resuming the hash chain
    /// from the last persisted event if one exists.
    pub async fn start(
        config: AuditConfig,
        storage: Arc<dyn AuditStorage>,
    ) -> Result<(Self, AuditPipelineHandle), crate::error::Error> {
        let chain = match storage.latest().await? {
            Some(last) => AuditChain::resume(
                last.hash.unwrap_or_default(),
                last.sequence,
            ),
            None => AuditChain::new(),
        };
        let chain = Arc::new(Mutex::new(chain));

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let dropped = Arc::new(AtomicU64::new(0));

        let syslog = config
            .syslog_address
            .as_ref()
            .and_then(|address| {
                SyslogSender::new(&SyslogConfig {
                    address: address.clone(),
                    transport: SyslogTransport::Udp,
                    facility: 13,
                    app_name: "opsplane".to_string(),
                })
                .ok()
            })
            .map(Arc::new);
        let otlp_export = config.otlp_export;

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let rx = rx.clone();
            let chain = chain.clone();
            let storage = storage.clone();
            let syslog = syslog.clone();
            let batch_size = config.batch_size;
            let flush_interval = Duration::from_millis(config.flush_interval_ms);

            workers.push(tokio::spawn(async move {
                run_worker(worker_id, rx, chain, storage, syslog, otlp_export, batch_size, flush_interval).await;
            }));
        }

        let handle = AuditPipelineHandle {
            sender: tx,
            enqueue_timeout: Duration::from_millis(config.enqueue_timeout_ms),
            dropped,
        };

        Ok((Self { workers }, handle))
    }

    /// Wait for all workers to finish (used during graceful shutdown after
    /// the last handle has been dropped so the channel closes).
    pub async fn join(self) {
        for worker in self.workers {
            let _ = worker.await;
        }
    }

    /// Graceful shutdown with a deadline (spec §4.1 "Shutdown(timeout)"):
    /// the caller is expected to have already dropped every
    /// [`AuditPipelineHandle`] clone so the channel closes and workers can
    /// drain their last batch. If workers haven't finished by `timeout`,
    /// the remaining ones are aborted and the event is logged as data loss —
    /// the `Err` variant lets operators tell a clean stop from one that lost
    /// events apart from a zero exit code.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), crate::error::Error> {
        let workers = self.workers;
        let total = workers.len();
        let abort_handles: Vec<_> = workers.iter().map(|w| w.abort_handle()).collect();

        match tokio::time::timeout(timeout, futures::future::join_all(workers)).await {
            Ok(_) => Ok(()),
            Err(_) => {
                for handle in abort_handles {
                    handle.abort();
                }
                warn!(workers = total, "audit pipeline shutdown timed out, forced worker cancellation");
                Err(crate::error::Error::Internal(
                    "audit pipeline shutdown timed out, some events may not have been persisted".into(),
                ))
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<AuditEvent>>>,
    chain: Arc<Mutex<AuditChain>>,
    storage: Arc<dyn AuditStorage>,
    syslog: Option<Arc<SyslogSender>>,
    otlp_export: bool,
    batch_size: usize,
    flush_interval: Duration,
) {
    loop {
        let mut batch = Vec::with_capacity(batch_size);
        let deadline = Instant::now() + flush_interval;
        let mut channel_closed = false;

        while batch.len() < batch_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let mut guard = rx.lock().await;
            match tokio::time::timeout(remaining, guard.recv()).await {
                Ok(Some(event)) => {
                    drop(guard);
                    batch.push(event);
                }
                Ok(None) => {
                    channel_closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            let sealed: Vec<AuditEvent> = {
                let mut chain = chain.lock().await;
                batch.into_iter().map(|event| chain.seal(event)).collect()
            };
            debug!(worker_id, count = sealed.len(), "flushing audit batch");
            if let Err(error) = storage.append_batch(&sealed).await {
                warn!(worker_id, %error, "failed to persist audit batch");
            }

            for event in &sealed {
                if otlp_export {
                    super::otlp::emit_audit_log(event);
                }
                if let Some(ref sender) = syslog {
                    if let Err(error) = sender.send(event).await {
                        warn!(worker_id, %error, "syslog export failed");
                    }
                }
            }
        }

        if channel_closed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::{Principal, Resource};
    use crate::audit::storage::memory::MemoryAuditStorage;

    #[tokio::test]
    async fn events_are_batched_and_persisted() {
        let storage = Arc::new(MemoryAuditStorage::new());
        let config = AuditConfig {
            channel_capacity: 100,
            workers: 1,
            batch_size: 5,
            flush_interval_ms: 200,
            enqueue_timeout_ms: 100,
            ..Default::default()
        };
        let (pipeline, handle) = AuditPipeline::start(config, storage.clone()).await.unwrap();

        for _ in 0..5 {
            handle
                .enqueue(AuditEvent::new(Principal::system(), "test", Resource::new("thing", "1"), "test"))
                .await;
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(handle);
        pipeline.join().await;

        let latest = storage.latest().await.unwrap();
        assert!(latest.is_some());
        assert_eq!(latest.unwrap().sequence, 5);
    }

    #[tokio::test]
    async fn full_queue_drops_rather_than_blocks() {
        let storage = Arc::new(MemoryAuditStorage::new());
        let config = AuditConfig {
            channel_capacity: 1,
            workers: 0,
            batch_size: 50,
            flush_interval_ms: 5000,
            enqueue_timeout_ms: 10,
            ..Default::default()
        };
        let (_pipeline, handle) = AuditPipeline::start(config, storage).await.unwrap();

        // No workers draining the channel: first send fills capacity 1,
        // second should time out and be dropped rather than hang the test.
        handle
            .enqueue(AuditEvent::new(Principal::system(), "a", Resource::new("thing", "1"), "test"))
            .await;
        handle
            .enqueue(AuditEvent::new(Principal::system(), "b", Resource::new("thing", "2"), "test"))
            .await;

        assert_eq!(handle.dropped_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_drains_in_flight_batch_within_deadline() {
        let storage = Arc::new(MemoryAuditStorage::new());
        let config = AuditConfig {
            channel_capacity: 100,
            workers: 1,
            batch_size: 5,
            flush_interval_ms: 200,
            enqueue_timeout_ms: 100,
            ..Default::default()
        };
        let (pipeline, handle) = AuditPipeline::start(config, storage.clone()).await.unwrap();

        handle
            .enqueue(AuditEvent::new(Principal::system(), "test", Resource::new("thing", "1"), "test"))
            .await;
        drop(handle);

        pipeline.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(storage.latest().await.unwrap().is_some());
    }
}
