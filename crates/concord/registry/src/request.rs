use concord_types::{PartyClass, PartyId};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Registration request as it arrives from outside the engine.
///
/// `declared_conflicts` must be present even when empty: a missing list means
/// the candidate never declared, which is grounds for outright rejection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub candidate_id: String,
    pub class: String,
    #[serde(default)]
    pub declared_conflicts: Option<Vec<String>>,
}

impl RegistrationRequest {
    pub fn new(
        candidate_id: impl Into<String>,
        class: impl Into<String>,
        declared_conflicts: Option<Vec<String>>,
    ) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            class: class.into(),
            declared_conflicts,
        }
    }

    /// Validate the request before any vote is opened on it.
    pub fn validate(&self) -> Result<ValidatedRegistration, RegistryError> {
        let candidate_id = self.candidate_id.trim();
        if candidate_id.is_empty() {
            return Err(RegistryError::EmptyCandidate);
        }
        let class: PartyClass = self.class.parse()?;
        let declared_conflicts = self
            .declared_conflicts
            .clone()
            .ok_or_else(|| RegistryError::ConflictsUndeclared(candidate_id.to_string()))?;

        Ok(ValidatedRegistration {
            candidate_id: PartyId::new(candidate_id),
            class,
            declared_conflicts,
        })
    }
}

/// A registration that passed the admission boundary and can be voted on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedRegistration {
    pub candidate_id: PartyId,
    pub class: PartyClass,
    pub declared_conflicts: Vec<String>,
}
