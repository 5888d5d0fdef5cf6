//! Audit Pipeline (spec §4.1)
//!
//! Every mutating action across the service — agent registration, task
//! triggers, probe monitor edits, terminal session starts, alert acks —
//! is recorded as an [`event::AuditEvent`] and handed to the
//! [`pipeline::AuditPipeline`]'s bounded queue. A small worker pool batches
//! and persists events, sealing each with a BLAKE3 hash chain
//! ([`chain::AuditChain`]) for tamper evidence, and best-effort mirrors them
//! to syslog/OTLP.
//!
//! Callers never await persistence directly — they hold an
//! [`logger::AuditLogger`] clone and call `log()`/`log_change()`, which
//! enqueues with a bounded wait and drops the event if the queue stays full
//! past `audit.enqueue_timeout_ms`.

pub mod archive;
pub mod chain;
pub mod event;
pub(crate) mod failure_tracker;
pub mod logger;
pub mod otlp;
pub mod pipeline;
pub mod storage;
pub mod syslog;
pub mod truncation;

pub use chain::{verify_chain, AuditChain, ChainVerificationError};
pub use event::{AuditEvent, ObjectDiff, Principal, PrincipalKind, Resource};
pub use logger::AuditLogger;
pub use pipeline::{AuditPipeline, AuditPipelineHandle};
pub use storage::AuditStorage;
pub use truncation::{truncate_object, TruncationResult};
