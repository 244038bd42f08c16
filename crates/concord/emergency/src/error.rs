use chrono::{DateTime, Utc};
use concord_audit::AuditError;
use concord_decision::DecisionError;
use concord_types::DecisionId;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EmergencyError {
    #[error("an emergency is already active (epoch {epoch})")]
    AlreadyActive { epoch: u64 },

    #[error("emergency entry {0} is already pending")]
    EntryPending(DecisionId),

    #[error("no emergency is active")]
    NotActive,

    #[error("emergency epoch {0} is unknown")]
    UnknownEpoch(u64),

    #[error("emergency epoch {0} has already been judged")]
    AlreadyJudged(u64),

    #[error("renewal {got} rejected: renewal {expected} is next")]
    RenewalConflict { expected: u32, got: u32 },

    #[error("renewal ratio {approvals}/{decisive} does not exceed the required {required:.4}")]
    RenewalThresholdNotMet {
        approvals: usize,
        decisive: usize,
        required: f64,
    },

    #[error("renewal blocked: review task {task_id} opened at {opened_at} is still open")]
    SanctionEscalationBlocked {
        task_id: Uuid,
        opened_at: DateTime<Utc>,
    },

    #[error("review task {0} not found")]
    UnknownReview(Uuid),

    #[error("emergency entry requires assent from class {0}")]
    ClassDidNotAssent(concord_types::PartyClass),

    #[error("unsanctioned emergency transition: {0}")]
    NotSanctioned(String),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
}

impl From<DecisionError> for EmergencyError {
    fn from(err: DecisionError) -> Self {
        match err {
            DecisionError::Audit(audit) => EmergencyError::Audit(audit),
            other => EmergencyError::NotSanctioned(other.to_string()),
        }
    }
}
