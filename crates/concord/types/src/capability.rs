//! Capability Manifest (positive permissions) and Constraint Set (negative
//! prohibitions) for a governed scope, plus the diffs executed decisions carry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decision::DecisionType;
use crate::sanction::{RevocationLevel, SanctionLevel};

/// Compute budget per rolling window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeQuota {
    pub units_per_window: u64,
    pub window_secs: u64,
}

impl Default for ComputeQuota {
    fn default() -> Self {
        Self {
            units_per_window: 1_000,
            window_secs: 3_600,
        }
    }
}

/// How sanctions on a scope translate into revocation levels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationPolicy {
    /// Sanction level at which each revocation level starts to apply.
    pub thresholds: BTreeMap<RevocationLevel, SanctionLevel>,
}

impl RevocationPolicy {
    /// Strongest revocation level triggered by `sanction`.
    pub fn level_for(&self, sanction: SanctionLevel) -> Option<RevocationLevel> {
        self.thresholds
            .iter()
            .filter(|(_, at)| sanction >= **at)
            .map(|(level, _)| *level)
            .max()
    }
}

impl Default for RevocationPolicy {
    fn default() -> Self {
        let thresholds = BTreeMap::from([
            (RevocationLevel::Throttle, SanctionLevel::S1),
            (RevocationLevel::Restrict, SanctionLevel::S2),
            (RevocationLevel::Quarantine, SanctionLevel::S3),
            (RevocationLevel::Suspend, SanctionLevel::S4),
            (RevocationLevel::Terminate, SanctionLevel::S5),
        ]);
        Self { thresholds }
    }
}

/// Positive permission list for a scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityManifest {
    /// Empty allowlist means "any tool not denied".
    pub tool_allowlist: Vec<String>,
    pub tool_denylist: Vec<String>,
    pub data_scopes: Vec<String>,
    pub network_egress: Vec<String>,
    pub compute_quota: ComputeQuota,
    pub memory_scope: Option<String>,
    pub revocation_policy: RevocationPolicy,
}

/// Emergency handling for a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyProfile {
    /// Whether emergency overlays may be applied to this scope at all.
    pub allow_overlays: bool,
    /// Action patterns treated as irreversible in addition to those flagged by the caller.
    pub irreversible_actions: Vec<String>,
}

impl Default for EmergencyProfile {
    fn default() -> Self {
        Self {
            allow_overlays: true,
            irreversible_actions: Vec::new(),
        }
    }
}

/// Negative prohibition list for a scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    /// Glob patterns matched against the action name.
    pub forbidden_actions: Vec<String>,
    /// Declared invariants, carried for constituents and audit.
    pub invariants: Vec<String>,
    /// Action categories vetoed outright.
    pub veto_categories: Vec<String>,
    /// Per-type appeal window overrides, in seconds.
    pub appeal_windows: BTreeMap<DecisionType, u64>,
    pub emergency_profile: EmergencyProfile,
}

/// Field-wise replacement of a [`CapabilityManifest`]. Unset fields are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_allowlist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_denylist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_egress: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_quota: Option<ComputeQuota>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_policy: Option<RevocationPolicy>,
}

impl CmDiff {
    pub fn is_empty(&self) -> bool {
        self == &CmDiff::default()
    }

    pub fn apply(&self, base: &CapabilityManifest) -> CapabilityManifest {
        let mut next = base.clone();
        if let Some(v) = &self.tool_allowlist {
            next.tool_allowlist = v.clone();
        }
        if let Some(v) = &self.tool_denylist {
            next.tool_denylist = v.clone();
        }
        if let Some(v) = &self.data_scopes {
            next.data_scopes = v.clone();
        }
        if let Some(v) = &self.network_egress {
            next.network_egress = v.clone();
        }
        if let Some(v) = self.compute_quota {
            next.compute_quota = v;
        }
        if let Some(v) = &self.memory_scope {
            next.memory_scope = Some(v.clone());
        }
        if let Some(v) = &self.revocation_policy {
            next.revocation_policy = v.clone();
        }
        next
    }
}

/// Field-wise replacement of a [`ConstraintSet`]. Unset fields are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_actions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invariants: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veto_categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appeal_windows: Option<BTreeMap<DecisionType, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_profile: Option<EmergencyProfile>,
}

impl CsDiff {
    pub fn is_empty(&self) -> bool {
        self == &CsDiff::default()
    }

    pub fn apply(&self, base: &ConstraintSet) -> ConstraintSet {
        let mut next = base.clone();
        if let Some(v) = &self.forbidden_actions {
            next.forbidden_actions = v.clone();
        }
        if let Some(v) = &self.invariants {
            next.invariants = v.clone();
        }
        if let Some(v) = &self.veto_categories {
            next.veto_categories = v.clone();
        }
        if let Some(v) = &self.appeal_windows {
            next.appeal_windows = v.clone();
        }
        if let Some(v) = &self.emergency_profile {
            next.emergency_profile = v.clone();
        }
        next
    }
}

/// Glob match where `*` stands for any run of characters, including none.
///
/// `*.external.com` matches `api.external.com`; a pattern without `*` must
/// match exactly.
pub fn matches_pattern(pattern: &str, candidate: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == candidate;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    let Some(mut rest) = candidate.strip_prefix(first) else {
        return false;
    };
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
