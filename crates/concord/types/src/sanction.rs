use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ScopeId;

/// Sanctions Ladder levels, S0 (Warning) through S5 (Terminate).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SanctionLevel {
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
}

impl SanctionLevel {
    pub const ALL: [SanctionLevel; 6] = [
        SanctionLevel::S0,
        SanctionLevel::S1,
        SanctionLevel::S2,
        SanctionLevel::S3,
        SanctionLevel::S4,
        SanctionLevel::S5,
    ];

    /// One step up; S5 stays at S5.
    pub fn escalate(self) -> SanctionLevel {
        match self {
            SanctionLevel::S0 => SanctionLevel::S1,
            SanctionLevel::S1 => SanctionLevel::S2,
            SanctionLevel::S2 => SanctionLevel::S3,
            SanctionLevel::S3 => SanctionLevel::S4,
            SanctionLevel::S4 | SanctionLevel::S5 => SanctionLevel::S5,
        }
    }

    /// One step down. `None` clears the sanction entirely (from S0).
    /// S5 never self-recovers and returns itself.
    pub fn deescalate(self) -> Option<SanctionLevel> {
        match self {
            SanctionLevel::S0 => None,
            SanctionLevel::S1 => Some(SanctionLevel::S0),
            SanctionLevel::S2 => Some(SanctionLevel::S1),
            SanctionLevel::S3 => Some(SanctionLevel::S2),
            SanctionLevel::S4 => Some(SanctionLevel::S3),
            SanctionLevel::S5 => Some(SanctionLevel::S5),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SanctionLevel::S5)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SanctionLevel::S0 => "warning",
            SanctionLevel::S1 => "throttle",
            SanctionLevel::S2 => "restrict",
            SanctionLevel::S3 => "quarantine",
            SanctionLevel::S4 => "suspend",
            SanctionLevel::S5 => "terminate",
        }
    }
}

impl fmt::Display for SanctionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.label())
    }
}

/// Severity of a reported violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Low,
    Moderate,
    High,
    Critical,
}

/// Capability revocation levels. Each is a strict superset of the one below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevocationLevel {
    Throttle,
    Restrict,
    Quarantine,
    Suspend,
    Terminate,
}

impl RevocationLevel {
    pub const ALL: [RevocationLevel; 5] = [
        RevocationLevel::Throttle,
        RevocationLevel::Restrict,
        RevocationLevel::Quarantine,
        RevocationLevel::Suspend,
        RevocationLevel::Terminate,
    ];
}

impl fmt::Display for RevocationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RevocationLevel::Throttle => "THROTTLE",
            RevocationLevel::Restrict => "RESTRICT",
            RevocationLevel::Quarantine => "QUARANTINE",
            RevocationLevel::Suspend => "SUSPEND",
            RevocationLevel::Terminate => "TERMINATE",
        };
        f.write_str(s)
    }
}

/// Current sanction standing of a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionRecord {
    pub scope: ScopeId,
    pub level: SanctionLevel,
    pub reason: String,
    pub issued_at: DateTime<Utc>,
    /// Earliest time a clean period could step this level down. `None` for S5.
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_strictly_ordered() {
        for pair in SanctionLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].escalate(), pair[1]);
        }
        assert_eq!(SanctionLevel::S5.escalate(), SanctionLevel::S5);
    }

    #[test]
    fn s5_does_not_self_recover() {
        assert_eq!(SanctionLevel::S5.deescalate(), Some(SanctionLevel::S5));
        assert_eq!(SanctionLevel::S1.deescalate(), Some(SanctionLevel::S0));
        assert_eq!(SanctionLevel::S0.deescalate(), None);
    }

    #[test]
    fn revocation_levels_ordered_and_named() {
        assert!(RevocationLevel::Throttle < RevocationLevel::Restrict);
        assert!(RevocationLevel::Suspend < RevocationLevel::Terminate);
        assert_eq!(
            serde_json::to_string(&RevocationLevel::Quarantine).unwrap(),
            "\"QUARANTINE\""
        );
    }
}
