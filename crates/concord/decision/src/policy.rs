use chrono::Duration;
use concord_types::DecisionType;
use serde::{Deserialize, Serialize};

/// Approval ratio requirement, compared in integer arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub numerator: u32,
    pub denominator: u32,
    /// Require strictly more than the ratio (simple majority).
    #[serde(default)]
    pub strict: bool,
}

impl Threshold {
    pub const fn two_thirds() -> Self {
        Self {
            numerator: 2,
            denominator: 3,
            strict: false,
        }
    }

    pub const fn simple_majority() -> Self {
        Self {
            numerator: 1,
            denominator: 2,
            strict: true,
        }
    }

    pub const fn three_quarters() -> Self {
        Self {
            numerator: 3,
            denominator: 4,
            strict: false,
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.denominator == 0 {
            return 1.0;
        }
        f64::from(self.numerator) / f64::from(self.denominator)
    }

    /// The more demanding of two thresholds.
    pub fn stricter(self, other: Threshold) -> Threshold {
        let lhs = u64::from(self.numerator) * u64::from(other.denominator);
        let rhs = u64::from(other.numerator) * u64::from(self.denominator);
        match lhs.cmp(&rhs) {
            std::cmp::Ordering::Greater => self,
            std::cmp::Ordering::Less => other,
            std::cmp::Ordering::Equal => Threshold {
                strict: self.strict || other.strict,
                ..self
            },
        }
    }

    /// Whether `approvals` out of `decisive` (approvals + rejections) meets the bar.
    pub fn is_met(&self, approvals: usize, decisive: usize) -> bool {
        if decisive == 0 || self.denominator == 0 {
            return false;
        }
        let lhs = approvals as u64 * u64::from(self.denominator);
        let rhs = decisive as u64 * u64::from(self.numerator);
        if self.strict {
            lhs > rhs
        } else {
            lhs >= rhs
        }
    }
}

/// Voting rules and windows for one decision type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypePolicy {
    pub threshold: Threshold,
    /// Minimum number of present parties, on top of one per class.
    #[serde(default = "default_min_participants")]
    pub min_participants: usize,
    /// Delay between proposal and the opening of the vote.
    #[serde(default)]
    pub voting_delay_secs: u64,
    pub voting_window_secs: u64,
    /// An approved decision not executed within this window expires.
    pub execution_window_secs: u64,
    /// Objections and appeals are accepted until `approved_at` plus this window.
    pub appeal_window_secs: u64,
}

fn default_min_participants() -> usize {
    3
}

impl TypePolicy {
    pub fn voting_delay(&self) -> Duration {
        Duration::seconds(self.voting_delay_secs as i64)
    }

    pub fn voting_window(&self) -> Duration {
        Duration::seconds(self.voting_window_secs as i64)
    }

    pub fn execution_window(&self) -> Duration {
        Duration::seconds(self.execution_window_secs as i64)
    }

    pub fn appeal_window(&self) -> Duration {
        Duration::seconds(self.appeal_window_secs as i64)
    }
}

/// Objection and appeal flood controls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingPolicy {
    /// Bond for the first repeat of an identical filing.
    pub base_bond: u64,
    /// Growth factor per further repeat; values below 2 are treated as 2.
    pub bond_multiplier: u64,
    /// Filings accepted per party within the rolling window.
    pub max_filings_per_window: usize,
    pub window_secs: u64,
}

impl FilingPolicy {
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs as i64)
    }

    /// Bond owed by the `occurrence`-th identical filing (1-based).
    pub fn bond_for(&self, occurrence: u32) -> u64 {
        if occurrence <= 1 {
            return 0;
        }
        let multiplier = self.bond_multiplier.max(2);
        let base = self.base_bond.max(1);
        (2..occurrence).fold(base, |bond, _| bond.saturating_mul(multiplier))
    }
}

impl Default for FilingPolicy {
    fn default() -> Self {
        Self {
            base_bond: 100,
            bond_multiplier: 2,
            max_filings_per_window: 3,
            window_secs: 3_600,
        }
    }
}

/// Decision engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub d1: TypePolicy,
    pub d2: TypePolicy,
    pub d3: TypePolicy,
    pub d4: TypePolicy,
    #[serde(default)]
    pub filing: FilingPolicy,
    /// Admission decisions require every registered party to be present.
    #[serde(default = "default_true")]
    pub admission_requires_full_roll: bool,
    /// Attempts to anchor an Evidence Package before giving up on head races.
    #[serde(default = "default_anchor_attempts")]
    pub anchor_attempts: u32,
}

fn default_true() -> bool {
    true
}

fn default_anchor_attempts() -> u32 {
    8
}

impl DecisionConfig {
    /// Policy for a governed type; `None` for D0.
    pub fn policy(&self, decision_type: DecisionType) -> Option<&TypePolicy> {
        match decision_type {
            DecisionType::D0 => None,
            DecisionType::D1 => Some(&self.d1),
            DecisionType::D2 => Some(&self.d2),
            DecisionType::D3 => Some(&self.d3),
            DecisionType::D4 => Some(&self.d4),
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        const HOUR: u64 = 3_600;
        const DAY: u64 = 24 * HOUR;
        Self {
            d1: TypePolicy {
                threshold: Threshold::two_thirds(),
                min_participants: 3,
                voting_delay_secs: 0,
                voting_window_secs: DAY,
                execution_window_secs: 7 * DAY,
                appeal_window_secs: 3 * DAY,
            },
            d2: TypePolicy {
                threshold: Threshold::two_thirds(),
                min_participants: 3,
                voting_delay_secs: 0,
                voting_window_secs: DAY,
                execution_window_secs: 7 * DAY,
                appeal_window_secs: 2 * DAY,
            },
            d3: TypePolicy {
                threshold: Threshold::simple_majority(),
                min_participants: 3,
                voting_delay_secs: 0,
                voting_window_secs: HOUR,
                execution_window_secs: HOUR,
                appeal_window_secs: DAY,
            },
            d4: TypePolicy {
                threshold: Threshold::three_quarters(),
                min_participants: 3,
                voting_delay_secs: 0,
                voting_window_secs: 7 * DAY,
                execution_window_secs: 14 * DAY,
                appeal_window_secs: 7 * DAY,
            },
            filing: FilingPolicy::default(),
            admission_requires_full_roll: true,
            anchor_attempts: default_anchor_attempts(),
        }
    }
}
