//! Evidence Packages: the write-once proof artifact of an executed decision.

use chrono::{DateTime, Utc};
use concord_audit::{AnchorPosition, AuditKind, AuditLog, AuditLogEntry};
use concord_types::{
    ChainHash, CmDiff, CsDiff, DecisionId, DecisionType, EpId, PartyClass, PartyId, ScopeId,
    VoteChoice,
};
use serde::{Deserialize, Serialize};

use crate::error::DecisionError;
use crate::proposal::{DecisionPayload, EmergencyMotion, ScopeChange};
use crate::signer::{PartySignature, SignatureAuthority};
use crate::tally::{QuorumProof, ThresholdProof};

const EP_DOMAIN: &[u8] = b"concord-evidence-package-v1:";
const EP_SIGNING_DOMAIN: &[u8] = b"concord-evidence-signing-v1:";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub party_id: PartyId,
    pub class: PartyClass,
    pub choice: VoteChoice,
    pub voted_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceTimestamps {
    pub proposed_at: DateTime<Utc>,
    pub voting_started_at: DateTime<Utc>,
    pub voting_ended_at: DateTime<Utc>,
    pub approved_at: DateTime<Utc>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidencePackage {
    pub ep_id: EpId,
    pub decision_id: DecisionId,
    pub decision_type: DecisionType,
    pub proposer: PartyId,
    pub participants: Vec<Participant>,
    pub quorum_proof: QuorumProof,
    pub threshold_proof: ThresholdProof,
    pub rationale: String,
    pub impact_statement: String,
    pub motion: DecisionPayload,
    pub timestamps: EvidenceTimestamps,
    /// The audit slot this package occupies.
    pub audit_anchor_ref: AnchorPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cm_diff: Option<CmDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cs_diff: Option<CsDiff>,
    #[serde(default)]
    pub signatures: Vec<PartySignature>,
}

/// Fields covered by party signatures: everything except the signatures
/// themselves and the audit slot, which is only known at anchoring time.
#[derive(Serialize)]
struct SigningView<'a> {
    ep_id: &'a EpId,
    decision_id: &'a DecisionId,
    decision_type: DecisionType,
    proposer: &'a PartyId,
    participants: &'a [Participant],
    quorum_proof: &'a QuorumProof,
    threshold_proof: &'a ThresholdProof,
    rationale: &'a str,
    impact_statement: &'a str,
    motion: &'a DecisionPayload,
    timestamps: &'a EvidenceTimestamps,
}

impl EvidencePackage {
    pub fn signing_digest(&self) -> Result<ChainHash, DecisionError> {
        let view = SigningView {
            ep_id: &self.ep_id,
            decision_id: &self.decision_id,
            decision_type: self.decision_type,
            proposer: &self.proposer,
            participants: &self.participants,
            quorum_proof: &self.quorum_proof,
            threshold_proof: &self.threshold_proof,
            rationale: &self.rationale,
            impact_statement: &self.impact_statement,
            motion: &self.motion,
            timestamps: &self.timestamps,
        };
        Ok(ChainHash::of_json(EP_SIGNING_DOMAIN, &view)?)
    }

    /// Digest of the complete package as anchored.
    pub fn digest(&self) -> Result<ChainHash, DecisionError> {
        Ok(ChainHash::of_json(EP_DOMAIN, self)?)
    }

    /// Check every attached signature against the signing digest.
    pub fn verify_signatures(&self, authority: &dyn SignatureAuthority) -> Result<(), DecisionError> {
        let digest = self.signing_digest()?;
        for signature in &self.signatures {
            if !authority.verify(digest.as_bytes(), signature, &signature.party_id) {
                return Err(DecisionError::InvalidSignature(signature.party_id.clone()));
            }
        }
        Ok(())
    }

    pub fn scope(&self) -> Option<&ScopeId> {
        self.motion.scope()
    }

    /// Reference that proves this package was anchored.
    pub fn reference(&self) -> Result<EpReference, DecisionError> {
        Ok(EpReference {
            ep_id: self.ep_id,
            decision_id: self.decision_id.clone(),
            decision_type: self.decision_type,
            anchor: self.audit_anchor_ref,
            digest: self.digest()?,
        })
    }

    /// The CM/CS change this package sanctions, if it carries one.
    pub fn sanctioned_change(&self) -> Result<Option<SanctionedChange>, DecisionError> {
        let Some(change) = self.motion.scope_change() else {
            return Ok(None);
        };
        Ok(Some(SanctionedChange {
            reference: self.reference()?,
            change: change.clone(),
        }))
    }

    /// Temporary overlays sanctioned by an emergency entry.
    pub fn overlay_changes(&self) -> Result<Vec<SanctionedChange>, DecisionError> {
        let DecisionPayload::Emergency(EmergencyMotion::Enter { overlays, .. }) = &self.motion
        else {
            return Ok(Vec::new());
        };
        let reference = self.reference()?;
        Ok(overlays
            .iter()
            .map(|change| SanctionedChange {
                reference: reference.clone(),
                change: change.clone(),
            })
            .collect())
    }
}

/// Proof-of-origin for an anchored package. Only obtainable from an
/// [`EvidencePackage`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EpReference {
    ep_id: EpId,
    decision_id: DecisionId,
    decision_type: DecisionType,
    anchor: AnchorPosition,
    digest: ChainHash,
}

impl EpReference {
    pub fn ep_id(&self) -> EpId {
        self.ep_id
    }

    pub fn decision_id(&self) -> &DecisionId {
        &self.decision_id
    }

    pub fn decision_type(&self) -> DecisionType {
        self.decision_type
    }

    pub fn anchor(&self) -> AnchorPosition {
        self.anchor
    }

    pub fn digest(&self) -> ChainHash {
        self.digest
    }

    /// Confirm the audit log holds this package at its anchor.
    pub fn verify(&self, log: &AuditLog) -> Result<AuditLogEntry, DecisionError> {
        let entry = log.entry(self.anchor.seq).ok_or_else(|| {
            DecisionError::NotAnchored(format!("no audit entry at seq {}", self.anchor.seq))
        })?;
        if entry.prev_hash != self.anchor.prev_hash {
            return Err(DecisionError::NotAnchored(format!(
                "audit entry {} has a different parent",
                entry.seq
            )));
        }
        if entry.payload.kind != AuditKind::EvidencePackage {
            return Err(DecisionError::NotAnchored(format!(
                "audit entry {} is a {:?} record",
                entry.seq, entry.payload.kind
            )));
        }
        let anchored: EvidencePackage = entry.payload.decode()?;
        if anchored.digest()? != self.digest {
            return Err(DecisionError::NotAnchored(format!(
                "evidence at seq {} does not match {}",
                entry.seq, self.ep_id
            )));
        }
        Ok(entry)
    }
}

/// A `(change, ep_reference)` pair: the only form in which the enforcement
/// layer accepts CM/CS changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanctionedChange {
    reference: EpReference,
    change: ScopeChange,
}

impl SanctionedChange {
    pub fn reference(&self) -> &EpReference {
        &self.reference
    }

    pub fn scope(&self) -> &ScopeId {
        &self.change.scope
    }

    pub fn cm_diff(&self) -> Option<&CmDiff> {
        self.change.cm_diff.as_ref()
    }

    pub fn cs_diff(&self) -> Option<&CsDiff> {
        self.change.cs_diff.as_ref()
    }
}

/// Assembles a package, refusing to produce one with a required field unset.
#[derive(Default)]
pub struct EvidenceBuilder {
    ep_id: Option<EpId>,
    decision_id: Option<DecisionId>,
    proposer: Option<PartyId>,
    participants: Vec<Participant>,
    quorum_proof: Option<QuorumProof>,
    threshold_proof: Option<ThresholdProof>,
    rationale: String,
    impact_statement: String,
    motion: Option<DecisionPayload>,
    timestamps: Option<EvidenceTimestamps>,
    anchor: Option<AnchorPosition>,
    signatures: Vec<PartySignature>,
}

impl EvidenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ep_id(mut self, ep_id: EpId) -> Self {
        self.ep_id = Some(ep_id);
        self
    }

    pub fn decision(mut self, decision_id: DecisionId, proposer: PartyId) -> Self {
        self.decision_id = Some(decision_id);
        self.proposer = Some(proposer);
        self
    }

    pub fn participants(mut self, participants: Vec<Participant>) -> Self {
        self.participants = participants;
        self
    }

    pub fn proofs(mut self, quorum: QuorumProof, threshold: ThresholdProof) -> Self {
        self.quorum_proof = Some(quorum);
        self.threshold_proof = Some(threshold);
        self
    }

    pub fn rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn impact_statement(mut self, impact: impl Into<String>) -> Self {
        self.impact_statement = impact.into();
        self
    }

    pub fn motion(mut self, motion: DecisionPayload) -> Self {
        self.motion = Some(motion);
        self
    }

    pub fn timestamps(mut self, timestamps: EvidenceTimestamps) -> Self {
        self.timestamps = Some(timestamps);
        self
    }

    pub fn anchor(mut self, anchor: AnchorPosition) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn signatures(mut self, signatures: Vec<PartySignature>) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn build(self) -> Result<EvidencePackage, DecisionError> {
        fn required<T>(value: Option<T>, field: &'static str) -> Result<T, DecisionError> {
            value.ok_or(DecisionError::EvidenceIncomplete { field })
        }

        let motion = required(self.motion, "motion")?;
        let decision_type = motion.decision_type();
        if !decision_type.requires_vote() {
            return Err(DecisionError::EvidenceIncomplete {
                field: "decision_type",
            });
        }
        if self.rationale.trim().is_empty() {
            return Err(DecisionError::EvidenceIncomplete { field: "rationale" });
        }
        if self.impact_statement.trim().is_empty() {
            return Err(DecisionError::EvidenceIncomplete {
                field: "impact_statement",
            });
        }
        if self.participants.is_empty() {
            return Err(DecisionError::EvidenceIncomplete {
                field: "participants",
            });
        }
        let quorum_proof = required(self.quorum_proof, "quorum_proof")?;
        let threshold_proof = required(self.threshold_proof, "threshold_proof")?;
        if !quorum_proof.satisfied || !threshold_proof.satisfied {
            return Err(DecisionError::EvidenceIncomplete {
                field: "satisfied proofs",
            });
        }

        let (cm_diff, cs_diff) = match motion.scope_change() {
            Some(change) => (change.cm_diff.clone(), change.cs_diff.clone()),
            None => (None, None),
        };

        Ok(EvidencePackage {
            ep_id: required(self.ep_id, "ep_id")?,
            decision_id: required(self.decision_id, "decision_id")?,
            decision_type,
            proposer: required(self.proposer, "proposer")?,
            participants: self.participants,
            quorum_proof,
            threshold_proof,
            rationale: self.rationale,
            impact_statement: self.impact_statement,
            motion,
            timestamps: required(self.timestamps, "timestamps")?,
            audit_anchor_ref: required(self.anchor, "audit_anchor_ref")?,
            cm_diff,
            cs_diff,
            signatures: self.signatures,
        })
    }
}
