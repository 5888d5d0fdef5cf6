//! BLAKE3 hash chain for audit event integrity
//!
//! Provides tamper detection by computing a BLAKE3 hash over each event's
//! content plus the previous event's hash, forming an ordered chain. Any
//! modification to a past event invalidates all subsequent hashes.
//!
//! Unlike a single sequential actor, the audit pipeline's worker pool seals
//! events from multiple tasks. `AuditChain` is therefore wrapped in a
//! `tokio::sync::Mutex` by its owner (`super::pipeline::AuditPipeline`) and
//! `seal` is called while holding that lock, so sequence/hash assignment
//! stays atomic regardless of which worker dequeued the event.

use super::event::AuditEvent;

pub struct AuditChain {
    previous_hash: Option<String>,
    sequence: u64,
}

impl AuditChain {
    /// Start a new chain from genesis (no previous hash).
    pub fn new() -> Self {
        Self {
            previous_hash: None,
            sequence: 0,
        }
    }

    /// Resume an existing chain from the last persisted event, loaded by
    /// storage at pipeline startup.
    pub fn resume(previous_hash: String, sequence: u64) -> Self {
        Self {
            previous_hash: Some(previous_hash),
            sequence,
        }
    }

    /// Seal an event: assign its sequence number and hash, and advance the
    /// chain tip. Must be called with exclusive access to the chain.
    pub fn seal(&mut self, mut event: AuditEvent) -> AuditEvent {
        self.sequence += 1;
        event.sequence = self.sequence;
        event.previous_hash = self.previous_hash.clone();

        let hash = compute_hash(&event);
        event.hash = Some(hash.clone());
        self.previous_hash = Some(hash);

        event
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn previous_hash(&self) -> Option<&str> {
        self.previous_hash.as_deref()
    }
}

impl Default for AuditChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash covers sequence, previous_hash, id, timestamp, actor, action, and
/// resource identity — the fields that define "what happened", so that a
/// tampered action or resource is detectable without rehashing payload data.
fn compute_hash(event: &AuditEvent) -> String {
    let mut hasher = blake3::Hasher::new();

    hasher.update(&event.sequence.to_le_bytes());
    if let Some(ref prev) = event.previous_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(event.id.as_str().as_bytes());
    hasher.update(event.timestamp.to_rfc3339().as_bytes());
    hasher.update(event.actor.id.as_bytes());
    hasher.update(event.action.as_bytes());
    hasher.update(event.resource.resource_type.as_bytes());
    hasher.update(event.resource.identifier.as_bytes());
    hasher.update(event.subsystem.as_bytes());

    hasher.finalize().to_hex().to_string()
}

/// Verify a chain of events (in sequence order): recompute each hash and
/// check linkage. Returns the sequence number of the first broken link.
pub fn verify_chain(events: &[AuditEvent]) -> Result<(), ChainVerificationError> {
    let mut expected_prev: Option<String> = None;

    for event in events {
        if event.previous_hash != expected_prev {
            return Err(ChainVerificationError {
                sequence: event.sequence,
                expected_previous_hash: expected_prev,
                actual_previous_hash: event.previous_hash.clone(),
            });
        }

        let recomputed = compute_hash(event);
        if event.hash.as_deref() != Some(recomputed.as_str()) {
            return Err(ChainVerificationError {
                sequence: event.sequence,
                expected_previous_hash: expected_prev,
                actual_previous_hash: event.previous_hash.clone(),
            });
        }

        expected_prev = event.hash.clone();
    }

    Ok(())
}

#[derive(Debug)]
pub struct ChainVerificationError {
    pub sequence: u64,
    pub expected_previous_hash: Option<String>,
    pub actual_previous_hash: Option<String>,
}

impl std::fmt::Display for ChainVerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "audit chain broken at sequence {}: expected previous_hash {:?}, got {:?}",
            self.sequence, self.expected_previous_hash, self.actual_previous_hash
        )
    }
}

impl std::error::Error for ChainVerificationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::{Principal, Resource};

    fn make_event() -> AuditEvent {
        AuditEvent::new(Principal::system(), "test.action", Resource::new("thing", "1"), "test")
    }

    #[test]
    fn seal_sets_sequence_and_hash() {
        let mut chain = AuditChain::new();
        let sealed = chain.seal(make_event());
        assert_eq!(sealed.sequence, 1);
        assert!(sealed.hash.is_some());
        assert!(sealed.previous_hash.is_none());
    }

    #[test]
    fn seal_links_events() {
        let mut chain = AuditChain::new();
        let e1 = chain.seal(make_event());
        let e2 = chain.seal(make_event());
        assert_eq!(e2.previous_hash, e1.hash);
        assert_eq!(e2.sequence, 2);
    }

    #[test]
    fn resume_continues_sequence() {
        let mut chain = AuditChain::new();
        let e1 = chain.seal(make_event());
        let mut resumed = AuditChain::resume(e1.hash.clone().unwrap(), e1.sequence);
        let e2 = resumed.seal(make_event());
        assert_eq!(e2.sequence, 2);
        assert_eq!(e2.previous_hash, e1.hash);
    }

    #[test]
    fn verify_chain_detects_tamper() {
        let mut chain = AuditChain::new();
        let mut events: Vec<AuditEvent> = (0..5).map(|_| chain.seal(make_event())).collect();
        events[2].hash = Some("tampered".to_string());
        assert!(verify_chain(&events).is_err());
    }

    #[test]
    fn verify_chain_accepts_intact_chain() {
        let mut chain = AuditChain::new();
        let events: Vec<AuditEvent> = (0..5).map(|_| chain.seal(make_event())).collect();
        assert!(verify_chain(&events).is_ok());
    }

    #[test]
    fn verify_chain_empty_is_ok() {
        assert!(verify_chain(&[]).is_ok());
    }
}
