//! What each revocation level takes away.

use std::collections::BTreeSet;

use concord_types::RevocationLevel;
use serde::{Deserialize, Serialize};

/// A single capability restriction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    /// Compute quota divided by the configured throttle divisor.
    ComputeThrottled,
    NetworkEgressBlocked,
    DataAccessBlocked,
    /// No tool or action may run.
    ActionsSuspended,
    /// Capabilities are gone until a governed reversal.
    CapabilitiesRevoked,
}

impl Restriction {
    /// The restriction a level adds on top of the level below it.
    fn introduced_by(level: RevocationLevel) -> Restriction {
        match level {
            RevocationLevel::Throttle => Restriction::ComputeThrottled,
            RevocationLevel::Restrict => Restriction::NetworkEgressBlocked,
            RevocationLevel::Quarantine => Restriction::DataAccessBlocked,
            RevocationLevel::Suspend => Restriction::ActionsSuspended,
            RevocationLevel::Terminate => Restriction::CapabilitiesRevoked,
        }
    }
}

/// Cumulative restrictions at `level`: every level keeps all restrictions of
/// the levels below it and adds one.
pub fn restrictions_for(level: Option<RevocationLevel>) -> BTreeSet<Restriction> {
    let Some(level) = level else {
        return BTreeSet::new();
    };
    RevocationLevel::ALL
        .iter()
        .filter(|l| **l <= level)
        .map(|l| Restriction::introduced_by(*l))
        .collect()
}
