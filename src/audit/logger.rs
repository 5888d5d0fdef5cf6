//! Audit logger — thin fire-and-forget API wrapper around the pipeline handle.
//!
//! Callers across the service (agent manager, scheduler, probe engine,
//! terminal broker, REST handlers) hold a clone of `AuditLogger` and call
//! `log()`; the pipeline worker pool does the actual persistence, so audit
//! logging never blocks the caller beyond the configured enqueue timeout.

use serde_json::Value;

use super::event::{AuditEvent, ObjectDiff, Principal, Resource};
use super::pipeline::AuditPipelineHandle;
use super::truncation;
use crate::config::AuditConfig;

#[derive(Clone)]
pub struct AuditLogger {
    pipeline: AuditPipelineHandle,
    config: AuditConfig,
}

impl AuditLogger {
    pub fn new(pipeline: AuditPipelineHandle, config: AuditConfig) -> Self {
        Self { pipeline, config }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Enqueue a fully built event.
    pub async fn log(&self, event: AuditEvent) {
        self.pipeline.enqueue(event).await;
    }

    /// Build and enqueue an event recording `action` by `actor` against
    /// `resource`, truncating `old`/`new` per the configured caps before the
    /// diff is attached.
    pub async fn log_change(
        &self,
        actor: Principal,
        action: impl Into<String>,
        resource: Resource,
        subsystem: impl Into<String>,
        old: Option<Value>,
        new: Option<Value>,
    ) {
        let diff = self.build_diff(old, new);
        let event = AuditEvent::new(actor, action, resource, subsystem).with_diff(diff);
        self.log(event).await;
    }

    fn build_diff(&self, old: Option<Value>, new: Option<Value>) -> ObjectDiff {
        let combined = serde_json::json!({"old": old, "new": new});
        let result = truncation::truncate_object(
            &combined,
            self.config.object_cap_bytes,
            self.config.field_cap_bytes,
        );
        ObjectDiff {
            old_json: old,
            new_json: new,
            truncation: if result.structure_preserved && result.truncated_fields.is_empty() {
                None
            } else {
                Some(result)
            },
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.pipeline.dropped_count()
    }
}
