use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DecisionId, PartyId};

/// Decision classes, ordered by the scrutiny they require.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DecisionType {
    /// Informational, reversible by default. Never voted on.
    D0,
    /// Structural change or party admission.
    D1,
    /// Capability restriction.
    D2,
    /// Emergency entry, renewal or exit.
    D3,
    /// Maximal-impact change, highest threshold.
    D4,
}

impl DecisionType {
    pub const GOVERNED: [DecisionType; 4] = [
        DecisionType::D1,
        DecisionType::D2,
        DecisionType::D3,
        DecisionType::D4,
    ];

    /// D0 bypasses voting; every other type goes through quorum and threshold.
    pub fn requires_vote(&self) -> bool {
        !matches!(self, DecisionType::D0)
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionType::D0 => "D0",
            DecisionType::D1 => "D1",
            DecisionType::D2 => "D2",
            DecisionType::D3 => "D3",
            DecisionType::D4 => "D4",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a decision.
///
/// `Proposed → Voting → {Approved | Rejected} → Executed | Appealed → Resolved`,
/// with `Expired` closing an approval that was never executed in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    Proposed,
    Voting,
    Approved,
    Rejected,
    Executed,
    Appealed,
    Resolved,
    Expired,
}

impl DecisionState {
    /// Whether the state has been reached through `finalize`.
    pub fn is_finalized(&self) -> bool {
        !matches!(self, DecisionState::Proposed | DecisionState::Voting)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DecisionState::Rejected | DecisionState::Resolved | DecisionState::Expired
        )
    }
}

impl fmt::Display for DecisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionState::Proposed => "proposed",
            DecisionState::Voting => "voting",
            DecisionState::Approved => "approved",
            DecisionState::Rejected => "rejected",
            DecisionState::Executed => "executed",
            DecisionState::Appealed => "appealed",
            DecisionState::Resolved => "resolved",
            DecisionState::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Approve,
    Reject,
    Abstain,
}

/// A single ballot. A later ballot from the same party replaces the earlier one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub decision_id: DecisionId,
    pub party_id: PartyId,
    pub choice: VoteChoice,
    pub timestamp: DateTime<Utc>,
}
