use chrono::{DateTime, Utc};
use concord_audit::AuditError;
use concord_registry::RegistryError;
use concord_types::{DecisionId, DecisionState, HashError, PartyId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("unknown party: {0}")]
    UnknownParty(PartyId),

    #[error("decision not found: {0}")]
    NotFound(DecisionId),

    #[error("decision {0} already exists")]
    Duplicate(DecisionId),

    #[error("malformed proposal: {0}")]
    MalformedProposal(String),

    #[error("voting closed on {decision_id} (state {state})")]
    VotingClosed {
        decision_id: DecisionId,
        state: DecisionState,
    },

    #[error("voting on {decision_id} opens at {opens_at}")]
    VotingNotOpen {
        decision_id: DecisionId,
        opens_at: DateTime<Utc>,
    },

    #[error("filing window for {decision_id} closed at {closed_at}")]
    WindowClosed {
        decision_id: DecisionId,
        closed_at: DateTime<Utc>,
    },

    #[error("evidence incomplete: {field} is unset")]
    EvidenceIncomplete { field: &'static str },

    #[error("decision {decision_id} is {state}, not approved")]
    NotApproved {
        decision_id: DecisionId,
        state: DecisionState,
    },

    #[error("decision {0} expired before execution")]
    Expired(DecisionId),

    #[error("execution halted: audit chain integrity violation at seq {seq} awaits review")]
    IntegrityHalt { seq: u64 },

    #[error("governance engine is read-only while the audit log is unavailable")]
    ReadOnly,

    #[error("party {party} declared a conflict with {subject}")]
    ConflictOfInterest { party: PartyId, subject: String },

    #[error("inadmissible grounds: {0}")]
    InadmissibleGrounds(String),

    #[error("too many requests from {party}; retry after {retry_after}")]
    TooManyRequests {
        party: PartyId,
        retry_after: DateTime<Utc>,
    },

    #[error("decision {decision_id} cannot be appealed in state {state}")]
    NotAppealable {
        decision_id: DecisionId,
        state: DecisionState,
    },

    #[error("decision {0} has no pending appeal")]
    NoPendingAppeal(DecisionId),

    #[error("evidence package is not anchored: {0}")]
    NotAnchored(String),

    #[error("invalid signature from {0}")]
    InvalidSignature(PartyId),

    #[error(transparent)]
    Registry(RegistryError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RegistryError> for DecisionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownParty(party) => DecisionError::UnknownParty(party),
            other => DecisionError::Registry(other),
        }
    }
}
