//! Runtime action requests and the decisions the enforcement layer returns.

use std::fmt;

use concord_types::{PartyId, RevocationLevel, ScopeId};
use serde::{Deserialize, Serialize};

use crate::error::EnforcementError;

/// An action a runtime wants to perform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Tool or action name, matched against lists and patterns.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Host the action will contact, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_host: Option<String>,
    /// Data scope the action will read or write, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_scope: Option<String>,
    #[serde(default)]
    pub compute_units: u64,
    /// Caller-declared irreversibility. The scope's emergency profile can
    /// mark further actions irreversible.
    #[serde(default)]
    pub irreversible: bool,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            category: None,
            egress_host: None,
            data_scope: None,
            compute_units: 0,
            irreversible: false,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn egress(mut self, host: impl Into<String>) -> Self {
        self.egress_host = Some(host.into());
        self
    }

    pub fn data(mut self, data_scope: impl Into<String>) -> Self {
        self.data_scope = Some(data_scope.into());
        self
    }

    pub fn compute(mut self, units: u64) -> Self {
        self.compute_units = units;
        self
    }

    pub fn irreversible(mut self) -> Self {
        self.irreversible = true;
        self
    }
}

/// Where and on whose behalf an action runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    pub scope: ScopeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<PartyId>,
}

impl ActionContext {
    pub fn new(scope: impl Into<ScopeId>) -> Self {
        Self {
            scope: scope.into(),
            actor: None,
        }
    }

    pub fn actor(mut self, actor: impl Into<PartyId>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// The specific rule that blocked an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DenialReason {
    UnknownScope,
    Revoked { level: RevocationLevel },
    IrreversibleDuringEmergency,
    Denylisted { pattern: String },
    NotAllowlisted,
    ForbiddenAction { pattern: String },
    VetoedCategory { category: String },
    EgressBlocked { host: String },
    DataScopeBlocked { data_scope: String },
    QuotaExhausted { requested: u64, remaining: u64 },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::UnknownScope => f.write_str("scope has no capability manifest"),
            DenialReason::Revoked { level } => write!(f, "capabilities revoked at level {level}"),
            DenialReason::IrreversibleDuringEmergency => f.write_str(
                "irreversible actions are forbidden during an emergency without a D4 exception",
            ),
            DenialReason::Denylisted { pattern } => {
                write!(f, "action matches denylist entry '{pattern}'")
            }
            DenialReason::NotAllowlisted => f.write_str("action is not on the tool allowlist"),
            DenialReason::ForbiddenAction { pattern } => {
                write!(f, "action matches forbidden pattern '{pattern}'")
            }
            DenialReason::VetoedCategory { category } => {
                write!(f, "category '{category}' is vetoed")
            }
            DenialReason::EgressBlocked { host } => {
                write!(f, "network egress to '{host}' is not permitted")
            }
            DenialReason::DataScopeBlocked { data_scope } => {
                write!(f, "data scope '{data_scope}' is not permitted")
            }
            DenialReason::QuotaExhausted {
                requested,
                remaining,
            } => write!(
                f,
                "compute quota exhausted: requested {requested}, remaining {remaining}"
            ),
        }
    }
}

/// Result of [`crate::EnforcementLayer::check_action_allowed`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialReason>,
}

impl AccessDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            denial: None,
        }
    }

    pub fn deny(reason: DenialReason) -> Self {
        Self {
            allowed: false,
            denial: Some(reason),
        }
    }

    /// Human-readable reason; empty when allowed.
    pub fn reason(&self) -> String {
        self.denial
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    pub fn into_result(self) -> Result<(), EnforcementError> {
        match self.denial {
            None => Ok(()),
            Some(reason) => Err(EnforcementError::CapabilityDenied {
                reason: reason.to_string(),
            }),
        }
    }
}
