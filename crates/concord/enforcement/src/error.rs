use concord_audit::AuditError;
use concord_decision::DecisionError;
use concord_types::{DecisionType, EpId, ScopeId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("unknown scope: {0}")]
    UnknownScope(ScopeId),

    #[error("capability denied: {reason}")]
    CapabilityDenied { reason: String },

    #[error("unsanctioned change rejected: {0}")]
    NotSanctioned(String),

    #[error("evidence package {ep_id} is {actual}; this operation requires {expected}")]
    WrongDecisionType {
        ep_id: EpId,
        expected: &'static str,
        actual: DecisionType,
    },

    #[error("evidence package {0} has already been applied")]
    AlreadyApplied(EpId),

    #[error("scope {0} already has a genesis manifest")]
    AlreadyBootstrapped(ScopeId),

    #[error("emergency overlays are not allowed on scope {0}")]
    OverlaysNotAllowed(ScopeId),

    #[error("no emergency is active")]
    NoActiveEmergency,

    #[error("enforcement state is read-only while the audit log is unavailable")]
    ReadOnly,

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
}

impl From<DecisionError> for EnforcementError {
    fn from(err: DecisionError) -> Self {
        match err {
            DecisionError::Audit(audit) => EnforcementError::Audit(audit),
            other => EnforcementError::NotSanctioned(other.to_string()),
        }
    }
}
