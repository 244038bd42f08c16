//! Engine-level errors

use concord_audit::AuditError;
use concord_decision::DecisionError;
use concord_emergency::EmergencyError;
use concord_enforcement::EnforcementError;
use concord_registry::RegistryError;
use thiserror::Error;

/// Result type for engine operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Enforcement(#[from] EnforcementError),

    #[error(transparent)]
    Emergency(#[from] EmergencyError),

    #[error("Decision {0} carries no executable motion")]
    NothingToExecute(String),
}
