//! Proposals as a closed tagged union over decision types.
//!
//! The decision type is derived from the payload variant, so a proposal can
//! never carry a type its content does not match.

use concord_registry::ValidatedRegistration;
use concord_types::{CmDiff, CsDiff, DecisionId, DecisionType, PartyId, SanctionLevel, ScopeId};
use serde::{Deserialize, Serialize};

use crate::error::DecisionError;

/// CM and/or CS change for one scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeChange {
    pub scope: ScopeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cm_diff: Option<CmDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cs_diff: Option<CsDiff>,
}

impl ScopeChange {
    pub fn manifest(scope: impl Into<ScopeId>, cm_diff: CmDiff) -> Self {
        Self {
            scope: scope.into(),
            cm_diff: Some(cm_diff),
            cs_diff: None,
        }
    }

    pub fn constraints(scope: impl Into<ScopeId>, cs_diff: CsDiff) -> Self {
        Self {
            scope: scope.into(),
            cm_diff: None,
            cs_diff: Some(cs_diff),
        }
    }

    fn validate(&self) -> Result<(), DecisionError> {
        let has_cm = self.cm_diff.as_ref().is_some_and(|d| !d.is_empty());
        let has_cs = self.cs_diff.as_ref().is_some_and(|d| !d.is_empty());
        if !has_cm && !has_cs {
            return Err(DecisionError::MalformedProposal(format!(
                "change to {} carries neither a CM nor a CS diff",
                self.scope
            )));
        }
        Ok(())
    }
}

/// D1 content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralChange {
    Admission(ValidatedRegistration),
    Amendment(ScopeChange),
}

/// D3 content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmergencyMotion {
    Enter {
        reason: String,
        duration_secs: u64,
        /// Temporary changes applied for the life of the emergency.
        #[serde(default)]
        overlays: Vec<ScopeChange>,
    },
    Renew {
        /// 1 for the first renewal, 2 for the second, and so on.
        renewal_index: u32,
        extension_secs: u64,
    },
    Exit {
        reason: String,
    },
}

/// D4 content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaximalChange {
    /// Permit one named irreversible action in a scope during an emergency.
    IrreversibleAction {
        scope: ScopeId,
        action: String,
        justification: String,
    },
    Constitutional(ScopeChange),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "motion", rename_all = "snake_case")]
pub enum DecisionPayload {
    /// D0: logged, never voted on.
    Informational { summary: String },
    /// D1.
    Structural(StructuralChange),
    /// D2.
    CapabilityRestriction(ScopeChange),
    /// D2: lift a terminal S5 sanction.
    SanctionReversal {
        scope: ScopeId,
        restore_to: Option<SanctionLevel>,
    },
    /// D3.
    Emergency(EmergencyMotion),
    /// D4.
    Maximal(MaximalChange),
}

impl DecisionPayload {
    pub fn decision_type(&self) -> DecisionType {
        match self {
            DecisionPayload::Informational { .. } => DecisionType::D0,
            DecisionPayload::Structural(_) => DecisionType::D1,
            DecisionPayload::CapabilityRestriction(_) | DecisionPayload::SanctionReversal { .. } => {
                DecisionType::D2
            }
            DecisionPayload::Emergency(_) => DecisionType::D3,
            DecisionPayload::Maximal(_) => DecisionType::D4,
        }
    }

    /// Per-type required fields, checked before the proposal is accepted.
    pub fn validate(&self) -> Result<(), DecisionError> {
        match self {
            DecisionPayload::Informational { summary } => {
                require_text(summary, "informational summary")
            }
            DecisionPayload::Structural(StructuralChange::Admission(_)) => Ok(()),
            DecisionPayload::Structural(StructuralChange::Amendment(change))
            | DecisionPayload::CapabilityRestriction(change)
            | DecisionPayload::Maximal(MaximalChange::Constitutional(change)) => change.validate(),
            DecisionPayload::SanctionReversal { restore_to, .. } => match restore_to {
                Some(SanctionLevel::S5) => Err(DecisionError::MalformedProposal(
                    "sanction reversal cannot restore to S5".into(),
                )),
                _ => Ok(()),
            },
            DecisionPayload::Emergency(EmergencyMotion::Enter {
                reason,
                duration_secs,
                overlays,
            }) => {
                require_text(reason, "emergency reason")?;
                if *duration_secs == 0 {
                    return Err(DecisionError::MalformedProposal(
                        "emergency duration must be positive".into(),
                    ));
                }
                overlays.iter().try_for_each(ScopeChange::validate)
            }
            DecisionPayload::Emergency(EmergencyMotion::Renew {
                renewal_index,
                extension_secs,
            }) => {
                if *renewal_index == 0 || *extension_secs == 0 {
                    return Err(DecisionError::MalformedProposal(
                        "renewal index and extension must be positive".into(),
                    ));
                }
                Ok(())
            }
            DecisionPayload::Emergency(EmergencyMotion::Exit { reason }) => {
                require_text(reason, "emergency exit reason")
            }
            DecisionPayload::Maximal(MaximalChange::IrreversibleAction {
                action,
                justification,
                ..
            }) => {
                require_text(action, "irreversible action")?;
                require_text(justification, "justification")
            }
        }
    }

    /// Scope the decision changes, if any.
    pub fn scope(&self) -> Option<&ScopeId> {
        match self {
            DecisionPayload::Structural(StructuralChange::Amendment(change))
            | DecisionPayload::CapabilityRestriction(change)
            | DecisionPayload::Maximal(MaximalChange::Constitutional(change)) => Some(&change.scope),
            DecisionPayload::SanctionReversal { scope, .. }
            | DecisionPayload::Maximal(MaximalChange::IrreversibleAction { scope, .. }) => Some(scope),
            _ => None,
        }
    }

    /// Scope-level change carried by the decision.
    pub fn scope_change(&self) -> Option<&ScopeChange> {
        match self {
            DecisionPayload::Structural(StructuralChange::Amendment(change))
            | DecisionPayload::CapabilityRestriction(change)
            | DecisionPayload::Maximal(MaximalChange::Constitutional(change)) => Some(change),
            _ => None,
        }
    }

    /// Subjects a voter may have declared a conflict with.
    pub fn conflict_subjects(&self) -> Vec<String> {
        let mut subjects = Vec::new();
        if let Some(scope) = self.scope() {
            subjects.push(scope.to_string());
        }
        match self {
            DecisionPayload::Structural(StructuralChange::Admission(reg)) => {
                subjects.push(reg.candidate_id.to_string());
            }
            DecisionPayload::Emergency(EmergencyMotion::Enter { overlays, .. }) => {
                subjects.extend(overlays.iter().map(|o| o.scope.to_string()));
            }
            _ => {}
        }
        subjects
    }
}

fn require_text(value: &str, what: &str) -> Result<(), DecisionError> {
    if value.trim().is_empty() {
        return Err(DecisionError::MalformedProposal(format!("{what} is empty")));
    }
    Ok(())
}

/// A proposal as submitted by a registered party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Caller-chosen id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<DecisionId>,
    pub proposer: PartyId,
    pub rationale: String,
    pub impact_statement: String,
    pub payload: DecisionPayload,
}

impl Proposal {
    pub fn new(proposer: impl Into<PartyId>, payload: DecisionPayload) -> Self {
        Self {
            decision_id: None,
            proposer: proposer.into(),
            rationale: String::new(),
            impact_statement: String::new(),
            payload,
        }
    }

    pub fn with_id(mut self, id: impl Into<DecisionId>) -> Self {
        self.decision_id = Some(id.into());
        self
    }

    pub fn rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn impact(mut self, impact_statement: impl Into<String>) -> Self {
        self.impact_statement = impact_statement.into();
        self
    }

    pub fn decision_type(&self) -> DecisionType {
        self.payload.decision_type()
    }
}
