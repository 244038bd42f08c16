use chrono::{DateTime, Utc};
use concord_types::ChainHash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AuditError;

const ENTRY_DOMAIN: &[u8] = b"concord-audit-entry-v1:";

/// What an audit payload records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    EvidencePackage,
    Informational,
    DecisionRejected,
    DecisionExpired,
    Filing,
    AppealResolved,
    PartyAdmitted,
    CapabilityApplied,
    CapabilityRevoked,
    OverlayDiscarded,
    EnforcementDenial,
    SanctionTransition,
    EmergencyTransition,
    ReviewTask,
    Judgment,
}

/// Payload of an audit entry: an Evidence Package or an enforcement event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditPayload {
    pub kind: AuditKind,
    /// Decision, scope or epoch the payload is about.
    pub subject: String,
    pub recorded_at: DateTime<Utc>,
    pub body: serde_json::Value,
}

impl AuditPayload {
    pub fn new<T: Serialize>(
        kind: AuditKind,
        subject: impl Into<String>,
        recorded_at: DateTime<Utc>,
        body: &T,
    ) -> Result<Self, AuditError> {
        Ok(Self {
            kind,
            subject: subject.into(),
            recorded_at,
            body: serde_json::to_value(body)?,
        })
    }

    /// Decode the body back into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AuditError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// A committed, immutable audit entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub seq: u64,
    pub payload: AuditPayload,
    pub prev_hash: ChainHash,
    pub this_hash: ChainHash,
    /// Index of the checkpoint this entry closed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root_ref: Option<u64>,
}

impl AuditLogEntry {
    /// Recompute `H(prev_hash || payload)` and compare with the stored hash.
    pub fn hash_matches(&self) -> Result<bool, AuditError> {
        Ok(compute_entry_hash(&self.prev_hash, &self.payload)? == self.this_hash)
    }
}

/// `this_hash = H(prev_hash || payload)` over the canonical JSON payload.
pub fn compute_entry_hash(
    prev_hash: &ChainHash,
    payload: &AuditPayload,
) -> Result<ChainHash, AuditError> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(ChainHash::digest(ENTRY_DOMAIN, &[prev_hash.as_bytes(), &bytes]))
}

/// The slot the next entry will occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPosition {
    pub seq: u64,
    pub prev_hash: ChainHash,
}

/// An entry built against a head but not yet committed.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingEntry {
    pub(crate) seq: u64,
    pub(crate) payload: AuditPayload,
    pub(crate) prev_hash: ChainHash,
    pub(crate) this_hash: ChainHash,
}

impl PendingEntry {
    pub fn build(position: AnchorPosition, payload: AuditPayload) -> Result<Self, AuditError> {
        let this_hash = compute_entry_hash(&position.prev_hash, &payload)?;
        Ok(Self {
            seq: position.seq,
            payload,
            prev_hash: position.prev_hash,
            this_hash,
        })
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn prev_hash(&self) -> ChainHash {
        self.prev_hash
    }

    pub fn this_hash(&self) -> ChainHash {
        self.this_hash
    }

    pub fn payload(&self) -> &AuditPayload {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(subject: &str) -> AuditPayload {
        AuditPayload::new(
            AuditKind::Informational,
            subject,
            Utc::now(),
            &serde_json::json!({"note": subject}),
        )
        .unwrap()
    }

    #[test]
    fn hash_binds_parent_and_payload() {
        let p = payload("a");
        let h1 = compute_entry_hash(&ChainHash::GENESIS, &p).unwrap();
        let other_parent = ChainHash::digest(b"x", &[b"y"]);
        let h2 = compute_entry_hash(&other_parent, &p).unwrap();
        let h3 = compute_entry_hash(&ChainHash::GENESIS, &payload("b")).unwrap();
        assert_ne!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn pending_entry_hash_matches_committed_form() {
        let position = AnchorPosition {
            seq: 1,
            prev_hash: ChainHash::GENESIS,
        };
        let pending = PendingEntry::build(position, payload("a")).unwrap();
        let entry = AuditLogEntry {
            seq: pending.seq(),
            payload: pending.payload().clone(),
            prev_hash: pending.prev_hash(),
            this_hash: pending.this_hash(),
            merkle_root_ref: None,
        };
        assert!(entry.hash_matches().unwrap());
    }

    #[test]
    fn payload_decodes_typed_body() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Body {
            level: u8,
        }
        let p = AuditPayload::new(
            AuditKind::SanctionTransition,
            "scope-1",
            Utc::now(),
            &Body { level: 3 },
        )
        .unwrap();
        assert_eq!(p.decode::<Body>().unwrap(), Body { level: 3 });
    }
}
