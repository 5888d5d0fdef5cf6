//! OpenTelemetry log export for audit events
//!
//! Emits each persisted event via `tracing::info!` with structured fields;
//! since `observability::init_tracing` wires an OTLP layer in production,
//! these records flow to the configured collector without a bespoke OTLP
//! client here.

use super::event::AuditEvent;

pub fn emit_audit_log(event: &AuditEvent) {
    tracing::info!(
        audit.event.id = %event.id,
        audit.event.sequence = event.sequence,
        audit.event.subsystem = %event.subsystem,
        audit.event.action = %event.action,
        audit.event.actor = %event.actor.id,
        audit.event.resource_type = %event.resource.resource_type,
        audit.event.resource_id = %event.resource.identifier,
        audit.event.hash = event.hash.as_deref().unwrap_or("-"),
        audit.event.request_id = event.request_id.as_deref().unwrap_or("-"),
        "audit.event"
    );
}
